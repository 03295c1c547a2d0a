use crate::catalog::Catalog;
use crate::models::EngagementEvent;
use ndarray::Array1;
use std::collections::HashMap;
use tracing::debug;

/// Sparse user x item matrix of accumulated interaction weights.
///
/// Rows are stored compressed (sorted `(item_index, weight)` pairs). Item
/// columns follow catalog order; user rows follow first-seen order of the
/// aggregated events, so row indices are not stable across rebuilds.
#[derive(Debug, Clone, Default)]
pub struct InteractionMatrix {
    rows: Vec<Vec<(usize, f32)>>,
    user_ids: Vec<String>,
    user_index: HashMap<String, usize>,
    n_items: usize,
}

impl InteractionMatrix {
    pub fn empty(n_items: usize) -> Self {
        Self {
            n_items,
            ..Default::default()
        }
    }

    pub fn n_users(&self) -> usize {
        self.rows.len()
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of stored `(user, item)` entries.
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nnz() == 0
    }

    pub fn user_row(&self, user_id: &str) -> Option<usize> {
        self.user_index.get(user_id).copied()
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn user_index(&self) -> &HashMap<String, usize> {
        &self.user_index
    }

    pub fn row(&self, user: usize) -> &[(usize, f32)] {
        &self.rows[user]
    }

    pub fn rows(&self) -> &[Vec<(usize, f32)>] {
        &self.rows
    }

    pub fn get(&self, user: usize, item: usize) -> f32 {
        self.rows[user]
            .binary_search_by_key(&item, |&(i, _)| i)
            .map(|pos| self.rows[user][pos].1)
            .unwrap_or(0.0)
    }

    /// Item indices the user has any stored interaction with.
    pub fn watched_items(&self, user_id: &str) -> Vec<usize> {
        self.user_row(user_id)
            .map(|u| self.rows[u].iter().map(|&(item, _)| item).collect())
            .unwrap_or_default()
    }

    /// Item-major view: for each item, the `(user_index, weight)` pairs.
    pub fn columns(&self) -> Vec<Vec<(usize, f32)>> {
        let mut columns = vec![Vec::new(); self.n_items];
        for (user, row) in self.rows.iter().enumerate() {
            for &(item, weight) in row {
                columns[item].push((user, weight));
            }
        }
        columns
    }

    /// Total weighted engagement per item across all users.
    pub fn column_sums(&self) -> Array1<f32> {
        let mut sums = Array1::<f32>::zeros(self.n_items);
        for row in &self.rows {
            for &(item, weight) in row {
                sums[item] += weight;
            }
        }
        sums
    }
}

/// Fold raw engagement events into a fresh interaction matrix.
///
/// Events on items outside the catalog, or with a non-finite weight, are
/// skipped. Zero and negative weights are kept. Weights accumulate
/// additively per `(user, item)` pair. No valid events yields an empty
/// matrix with zero users.
pub fn aggregate(catalog: &Catalog, events: &[EngagementEvent]) -> InteractionMatrix {
    let mut user_ids: Vec<String> = Vec::new();
    let mut user_index: HashMap<String, usize> = HashMap::new();
    let mut accumulated: Vec<HashMap<usize, f32>> = Vec::new();
    let mut skipped = 0usize;
    let mut non_finite = 0usize;

    for event in events {
        let Some(item) = catalog.index_of(&event.item_id) else {
            skipped += 1;
            continue;
        };
        let weight = event.weight();
        if !weight.is_finite() {
            non_finite += 1;
            continue;
        }

        let user = *user_index.entry(event.user_id.clone()).or_insert_with(|| {
            user_ids.push(event.user_id.clone());
            accumulated.push(HashMap::new());
            user_ids.len() - 1
        });

        *accumulated[user].entry(item).or_insert(0.0) += weight;
    }

    if skipped > 0 {
        debug!(skipped, "Skipped events referencing unknown items");
    }
    if non_finite > 0 {
        debug!(non_finite, "Skipped events with non-finite values");
    }

    let rows = accumulated
        .into_iter()
        .map(|cells| {
            let mut row: Vec<(usize, f32)> = cells.into_iter().collect();
            row.sort_unstable_by_key(|&(item, _)| item);
            row
        })
        .collect();

    InteractionMatrix {
        rows,
        user_ids,
        user_index,
        n_items: catalog.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogItem, EventType};

    fn catalog() -> Catalog {
        let items = ["a", "b", "c"]
            .iter()
            .map(|id| CatalogItem {
                id: id.to_string(),
                title: id.to_string(),
                genres: vec![],
                tags: vec![],
                year: 2000,
                rating: 5.0,
            })
            .collect();
        Catalog::new(items).unwrap()
    }

    #[test]
    fn test_weights_accumulate_per_pair() {
        let events = vec![
            EngagementEvent::new("u1", "a", EventType::ViewComplete, 1.0),
            EngagementEvent::new("u1", "a", EventType::Rating, 2.0),
            EngagementEvent::new("u1", "c", EventType::Search, 1.0),
            EngagementEvent::new("u2", "a", EventType::ViewStart, 0.5),
        ];
        let matrix = aggregate(&catalog(), &events);

        assert_eq!(matrix.n_users(), 2);
        assert_eq!(matrix.n_items(), 3);
        assert_eq!(matrix.nnz(), 3);
        assert!((matrix.get(0, 0) - 10.0).abs() < 1e-6);
        assert!((matrix.get(0, 2) - 0.5).abs() < 1e-6);
        assert_eq!(matrix.get(0, 1), 0.0);
        assert!((matrix.get(1, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_items_skipped() {
        let events = vec![
            EngagementEvent::new("ghost", "zzz", EventType::ViewComplete, 1.0),
            EngagementEvent::new("u1", "b", EventType::ViewComplete, 1.0),
        ];
        let matrix = aggregate(&catalog(), &events);

        assert_eq!(matrix.n_users(), 1);
        assert!(matrix.user_row("ghost").is_none());
        assert_eq!(matrix.watched_items("u1"), vec![1]);
    }

    #[test]
    fn test_non_finite_values_skipped_but_zero_and_negative_kept() {
        let events = vec![
            EngagementEvent::new("u1", "a", EventType::ViewStart, f32::NAN),
            EngagementEvent::new("u1", "b", EventType::ViewStart, f32::INFINITY),
            EngagementEvent::new("u2", "b", EventType::ViewComplete, 0.0),
            EngagementEvent::new("u2", "c", EventType::Rating, -1.0),
        ];
        let matrix = aggregate(&catalog(), &events);

        assert!(matrix.user_row("u1").is_none());
        assert_eq!(matrix.watched_items("u2"), vec![1, 2]);
        assert_eq!(matrix.column_sums().to_vec(), vec![0.0, 0.0, -3.0]);
    }

    #[test]
    fn test_no_valid_events_is_empty_matrix() {
        let matrix = aggregate(&catalog(), &[]);
        assert_eq!(matrix.n_users(), 0);
        assert_eq!(matrix.n_items(), 3);
        assert!(matrix.is_empty());
        assert!(matrix.column_sums().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_user_rows_follow_first_seen_order() {
        let events = vec![
            EngagementEvent::new("late", "a", EventType::ViewStart, 1.0),
            EngagementEvent::new("early", "b", EventType::ViewStart, 1.0),
            EngagementEvent::new("late", "b", EventType::ViewStart, 1.0),
        ];
        let matrix = aggregate(&catalog(), &events);
        assert_eq!(matrix.user_ids(), &["late".to_string(), "early".to_string()]);
    }

    #[test]
    fn test_columns_and_sums() {
        let events = vec![
            EngagementEvent::new("u1", "a", EventType::ViewStart, 1.0),
            EngagementEvent::new("u2", "a", EventType::ViewStart, 2.0),
            EngagementEvent::new("u2", "b", EventType::ViewStart, 1.0),
        ];
        let matrix = aggregate(&catalog(), &events);
        let columns = matrix.columns();
        assert_eq!(columns[0], vec![(0, 1.0), (1, 2.0)]);
        assert_eq!(columns[2], Vec::<(usize, f32)>::new());

        let sums = matrix.column_sums();
        assert_eq!(sums.to_vec(), vec![3.0, 1.0, 0.0]);
    }
}
