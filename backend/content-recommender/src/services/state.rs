use crate::models::TrainingMetadata;
use crate::services::aggregator::InteractionMatrix;
use crate::services::trainer::LatentFactorModel;

/// Immutable snapshot published by the retrain pipeline.
///
/// Matrix, user index, factors and metadata always come from the same
/// training run; a snapshot is replaced as a whole, never mutated.
#[derive(Debug)]
pub struct RecommenderState {
    pub matrix: InteractionMatrix,
    pub model: Option<LatentFactorModel>,
    pub metadata: TrainingMetadata,
}

impl RecommenderState {
    pub fn has_collaborative_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_version(&self) -> u64 {
        self.metadata.model_version
    }
}
