use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::models::{Recommendation, RecommendationSource};
use crate::services::content_index::ContentIndex;
use crate::services::state::RecommenderState;
use ndarray::Array1;

/// Score assigned to watched items; they never reach the ranked output.
pub const EXCLUDED_SCORE: f32 = -1.0;

const SCORE_PRECISION: f32 = 10_000.0;

/// Blends collaborative and content signals into ranked lists.
///
/// Blend priority:
/// 1. collaborative factor + enough watched items -> hybrid
/// 2. collaborative factor, nothing watched -> collaborative
/// 3. watched items only -> content
/// 4. no history -> catalog rating (trending)
#[derive(Debug, Clone)]
pub struct Scorer {
    collab_weight: f32,
    min_interactions_for_collab: usize,
}

impl Scorer {
    pub fn new(collab_weight: f32, min_interactions_for_collab: usize) -> Self {
        Self {
            collab_weight,
            min_interactions_for_collab,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.collab_weight, config.min_interactions_for_collab)
    }

    pub fn recommend(
        &self,
        state: &RecommenderState,
        catalog: &Catalog,
        content_index: &ContentIndex,
        user_id: &str,
        top_k: usize,
    ) -> Vec<Recommendation> {
        let watched = state.matrix.watched_items(user_id);

        let collab = state
            .model
            .as_ref()
            .and_then(|model| model.scores_for(user_id))
            .map(min_max_normalize);
        let content = content_index.mean_similarity(&watched);

        let (mut scores, source) = match collab {
            Some(collab)
                if !watched.is_empty() && watched.len() >= self.min_interactions_for_collab =>
            {
                let w = self.collab_weight;
                (collab * w + content * (1.0 - w), RecommendationSource::Hybrid)
            }
            Some(collab) if watched.is_empty() => (collab, RecommendationSource::Collaborative),
            _ if !watched.is_empty() => (content, RecommendationSource::Content),
            _ => (rating_scores(catalog), RecommendationSource::Trending),
        };

        for &item in &watched {
            scores[item] = EXCLUDED_SCORE;
        }

        rank(&scores, &watched, top_k)
            .into_iter()
            .map(|idx| {
                Recommendation::from_item(&catalog.items()[idx], round_score(scores[idx]), source)
            })
            .collect()
    }

    /// Global ranking by total weighted engagement, falling back to
    /// catalog rating when nothing has been observed.
    pub fn trending(
        &self,
        state: Option<&RecommenderState>,
        catalog: &Catalog,
        top_k: usize,
    ) -> Vec<Recommendation> {
        let engagement = state
            .filter(|s| !s.matrix.is_empty())
            .map(|s| s.matrix.column_sums());

        let (raw, scores) = match engagement {
            Some(sums) => {
                let normalized = min_max_normalize(sums.clone());
                (sums, normalized)
            }
            None => {
                let ratings = rating_scores(catalog);
                (ratings.clone(), ratings)
            }
        };

        rank(&raw, &[], top_k)
            .into_iter()
            .map(|idx| {
                Recommendation::from_item(
                    &catalog.items()[idx],
                    round_score(scores[idx]),
                    RecommendationSource::Trending,
                )
            })
            .collect()
    }
}

/// Item indices ordered by score descending; ties keep catalog order.
/// Indices in `excluded` are dropped regardless of their score.
fn rank(scores: &Array1<f32>, excluded: &[usize], top_k: usize) -> Vec<usize> {
    let mut keep = vec![true; scores.len()];
    for &idx in excluded {
        keep[idx] = false;
    }

    let mut order: Vec<usize> = (0..scores.len()).filter(|&idx| keep[idx]).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(top_k);
    order
}

/// Scale to [0, 1]; a collapsed range yields the zero vector.
pub fn min_max_normalize(scores: Array1<f32>) -> Array1<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return Array1::zeros(scores.len());
    }
    scores.mapv(|v| (v - min) / range)
}

fn rating_scores(catalog: &Catalog) -> Array1<f32> {
    catalog.items().iter().map(|item| item.rating / 10.0).collect()
}

fn round_score(score: f32) -> f32 {
    (score * SCORE_PRECISION).round() / SCORE_PRECISION
}
