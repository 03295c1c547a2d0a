pub mod aggregator;
pub mod content_index;
pub mod retrain;
pub mod scoring;
pub mod state;
pub mod trainer;

pub use aggregator::{aggregate, InteractionMatrix};
pub use content_index::ContentIndex;
pub use retrain::{
    create_retrain_queue, RetrainCoordinator, RetrainJob, RetrainWorker, StateSubscriber,
    TrainingPipeline,
};
pub use scoring::{Scorer, EXCLUDED_SCORE};
pub use state::RecommenderState;
pub use trainer::{AlsConfig, AlsTrainer, LatentFactorModel};
