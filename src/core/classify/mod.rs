pub mod engine;
pub mod model;

pub use engine::{argmax, region_for_video, ClassificationEngine, DirectoryScores, ScoreOutcome, VideoScore};
pub use model::{Classifier, LinearModel, ModelError};
