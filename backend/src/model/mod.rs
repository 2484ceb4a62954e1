pub mod artifacts;
pub mod classifier;
pub mod lstm;

pub use artifacts::{ArtifactPaths, ModelArtifacts, shared_artifacts};
pub use classifier::{ClassifierError, SequenceClassifier};
pub use lstm::{CropHealthLstm, ModelError};
