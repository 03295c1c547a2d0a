//! Static content catalog.
//!
//! Loaded once at startup and shared read-only by the content index and the
//! scoring engine. Item order is significant: it fixes the column index of
//! every item in the interaction matrix and breaks score ties.

use crate::error::{RecommenderError, Result};
use crate::models::{CatalogItem, EngagementEvent, EventType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(RecommenderError::EmptyCatalog);
        }

        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), position).is_some() {
                return Err(RecommenderError::Catalog(format!(
                    "duplicate item id '{}'",
                    item.id
                )));
            }
        }

        Ok(Self { items, index })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
        let catalog = Self::new(items)?;

        info!(
            path = %path.display(),
            items = catalog.len(),
            "Catalog loaded"
        );

        Ok(catalog)
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}

#[derive(Debug, Deserialize)]
struct SeedEventRecord {
    user_id: String,
    item_id: String,
    event_type: String,
    value: f32,
}

/// Load seed interactions used to warm the collaborative model at startup.
pub fn load_seed_events(path: impl AsRef<Path>) -> Result<Vec<EngagementEvent>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let records: Vec<SeedEventRecord> = serde_json::from_str(&raw)?;

    Ok(records
        .into_iter()
        .map(|r| {
            EngagementEvent::new(
                r.user_id,
                r.item_id,
                EventType::from_stored(&r.event_type),
                r.value,
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            title: id.to_uppercase(),
            genres: vec!["drama".to_string()],
            tags: vec![],
            year: 2000,
            rating: 7.0,
        }
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        assert!(matches!(
            Catalog::new(Vec::new()),
            Err(RecommenderError::EmptyCatalog)
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = Catalog::new(vec![item("a"), item("a")]);
        assert!(matches!(result, Err(RecommenderError::Catalog(_))));
    }

    #[test]
    fn test_lookup_preserves_order() {
        let catalog = Catalog::new(vec![item("a"), item("b"), item("c")]).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.index_of("b"), Some(1));
        assert_eq!(catalog.get("c").map(|i| i.title.as_str()), Some("C"));
        assert!(!catalog.contains("z"));
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog.json");
        let catalog = Catalog::from_json_file(path).expect("bundled catalog should load");
        assert_eq!(catalog.len(), 50);
        assert_eq!(catalog.items()[0].id, "m001");
    }

    #[test]
    fn test_bundled_seed_events_reference_catalog() {
        let catalog_path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog.json");
        let seed_path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/seed_events.json");
        let catalog = Catalog::from_json_file(catalog_path).unwrap();
        let events = load_seed_events(seed_path).expect("seed events should load");

        assert!(!events.is_empty());
        assert!(events.iter().all(|e| catalog.contains(&e.item_id)));
        assert!(events.iter().all(|e| e.event_type != EventType::Unrecognized));
    }
}
