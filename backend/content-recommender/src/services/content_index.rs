use crate::catalog::Catalog;
use crate::error::{RecommenderError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Content-based similarity index (static).
///
/// Algorithm:
/// 1. One document per item: genre tokens followed by free-text tags
/// 2. TF-IDF over unigrams and bigrams (smoothed idf, l2-normalized rows)
/// 3. Pairwise cosine similarity -> dense N x N matrix in [0, 1]
///
/// Built once from the catalog; never rebuilt while the process lives.
#[derive(Debug, Clone)]
pub struct ContentIndex {
    similarity: Array2<f32>,
    vocabulary_size: usize,
}

impl ContentIndex {
    pub fn build(catalog: &Catalog) -> Result<Self> {
        if catalog.is_empty() {
            return Err(RecommenderError::EmptyCatalog);
        }

        let documents: Vec<Vec<String>> = catalog
            .items()
            .iter()
            .map(|item| {
                let text = format!("{} {}", item.genres.join(" "), item.tags.join(" "));
                terms(&text)
            })
            .collect();

        let tfidf = TfidfMatrix::fit(&documents);
        let similarity = tfidf
            .weights
            .dot(&tfidf.weights.t())
            .mapv(|v| v.clamp(0.0, 1.0));

        info!(
            items = catalog.len(),
            vocabulary = tfidf.vocabulary_size,
            "Content index built"
        );

        Ok(Self {
            similarity,
            vocabulary_size: tfidf.vocabulary_size,
        })
    }

    pub fn n_items(&self) -> usize {
        self.similarity.nrows()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    pub fn similarity(&self, a: usize, b: usize) -> f32 {
        self.similarity[[a, b]]
    }

    pub fn row(&self, item: usize) -> ArrayView1<'_, f32> {
        self.similarity.row(item)
    }

    /// Mean similarity row over `watched` item indices; zero vector when
    /// nothing was watched.
    pub fn mean_similarity(&self, watched: &[usize]) -> Array1<f32> {
        let mut scores = Array1::<f32>::zeros(self.n_items());
        if watched.is_empty() {
            return scores;
        }
        for &item in watched {
            scores += &self.similarity.row(item);
        }
        scores / watched.len() as f32
    }

    pub fn matrix(&self) -> &Array2<f32> {
        &self.similarity
    }
}

/// Lowercased word tokens of length >= 2 followed by adjacent bigrams.
fn terms(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .collect();

    let mut terms: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    terms.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    terms
}

struct TfidfMatrix {
    weights: Array2<f32>,
    vocabulary_size: usize,
}

impl TfidfMatrix {
    fn fit(documents: &[Vec<String>]) -> Self {
        // Sorted vocabulary keeps column order deterministic.
        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in documents {
            let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let vocabulary: HashMap<&str, usize> = doc_freq
            .keys()
            .enumerate()
            .map(|(column, term)| (*term, column))
            .collect();

        let n_docs = documents.len() as f32;
        let idf: Vec<f32> = doc_freq
            .values()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let mut weights = Array2::<f32>::zeros((documents.len(), vocabulary.len()));
        for (row, doc) in documents.iter().enumerate() {
            for term in doc {
                if let Some(&column) = vocabulary.get(term.as_str()) {
                    weights[[row, column]] += 1.0;
                }
            }
        }
        for (column, factor) in idf.iter().enumerate() {
            weights.column_mut(column).mapv_inplace(|tf| tf * factor);
        }

        for mut row in weights.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }

        Self {
            vocabulary_size: vocabulary.len(),
            weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogItem;

    fn item(id: &str, genres: &[&str], tags: &[&str]) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            title: id.to_string(),
            genres: genres.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            year: 2010,
            rating: 7.5,
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(vec![
            item("a", &["sci-fi", "thriller"], &["dreams", "heist"]),
            item("b", &["sci-fi", "drama"], &["space", "time"]),
            item("c", &["comedy"], &["teen", "friendship"]),
            item("d", &["sci-fi", "thriller"], &["dreams", "ai"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_terms_include_bigrams() {
        let t = terms("Sci-Fi thriller x");
        assert_eq!(t, vec!["sci", "fi", "thriller", "sci fi", "fi thriller"]);
    }

    #[test]
    fn test_similarity_is_symmetric_and_bounded() {
        let index = ContentIndex::build(&sample_catalog()).unwrap();
        let n = index.n_items();
        for a in 0..n {
            for b in 0..n {
                let s = index.similarity(a, b);
                assert!((0.0..=1.0).contains(&s));
                assert!((s - index.similarity(b, a)).abs() < 1e-6);
            }
            assert!((index.similarity(a, a) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_shared_vocabulary_ranks_higher() {
        let index = ContentIndex::build(&sample_catalog()).unwrap();
        // a and d share genres and a tag; a and c share nothing.
        assert!(index.similarity(0, 3) > index.similarity(0, 1));
        assert!(index.similarity(0, 1) > index.similarity(0, 2));
        assert_eq!(index.similarity(0, 2), 0.0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let catalog = sample_catalog();
        let first = ContentIndex::build(&catalog).unwrap();
        let second = ContentIndex::build(&catalog).unwrap();
        assert_eq!(first.matrix(), second.matrix());
    }

    #[test]
    fn test_mean_similarity() {
        let index = ContentIndex::build(&sample_catalog()).unwrap();
        let empty = index.mean_similarity(&[]);
        assert!(empty.iter().all(|&v| v == 0.0));

        let mean = index.mean_similarity(&[0, 1]);
        let expected = (index.similarity(0, 3) + index.similarity(1, 3)) / 2.0;
        assert!((mean[3] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_item_without_text_has_zero_similarity() {
        let catalog = Catalog::new(vec![item("a", &["drama"], &[]), item("b", &[], &[])]).unwrap();
        let index = ContentIndex::build(&catalog).unwrap();
        assert_eq!(index.similarity(1, 1), 0.0);
        assert_eq!(index.similarity(0, 1), 0.0);
    }
}
