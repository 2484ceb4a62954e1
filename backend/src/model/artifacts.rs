use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{info, warn};

use super::classifier::SequenceClassifier;
use super::lstm::CropHealthLstm;
use crate::features::{FEATURE_COUNT, FeatureBuilder, StandardScaler};

pub const DEFAULT_WEIGHTS_PATH: &str = "models/saved/lstm_model.json";
pub const DEFAULT_SCALER_PATH: &str = "models/saved/scaler.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub weights: PathBuf,
    pub scaler: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            weights: PathBuf::from(DEFAULT_WEIGHTS_PATH),
            scaler: PathBuf::from(DEFAULT_SCALER_PATH),
        }
    }
}

impl ArtifactPaths {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            weights: lookup("MODEL_WEIGHTS_PATH").map(PathBuf::from).unwrap_or(defaults.weights),
            scaler: lookup("SCALER_PATH").map(PathBuf::from).unwrap_or(defaults.scaler),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Trained weights plus the fitted scaler. Either may be missing, in which
/// case the pipeline runs degraded instead of refusing to start.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    classifier: Arc<SequenceClassifier>,
    scaler: Option<Arc<StandardScaler>>,
}

lazy_static! {
    static ref SHARED_ARTIFACTS: Arc<ModelArtifacts> =
        Arc::new(ModelArtifacts::load(&ArtifactPaths::from_env()));
}

/// Process-wide artifacts, loaded on first use.
pub fn shared_artifacts() -> Arc<ModelArtifacts> {
    SHARED_ARTIFACTS.clone()
}

impl ModelArtifacts {
    pub fn new(classifier: SequenceClassifier, scaler: Option<StandardScaler>) -> Self {
        Self {
            classifier: Arc::new(classifier),
            scaler: scaler.map(Arc::new),
        }
    }

    pub fn load(paths: &ArtifactPaths) -> Self {
        Self::new(load_classifier(&paths.weights), load_scaler(&paths.scaler))
    }

    pub fn classifier(&self) -> Arc<SequenceClassifier> {
        self.classifier.clone()
    }

    pub fn has_scaler(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn feature_builder(&self, min_time_steps: usize) -> FeatureBuilder {
        FeatureBuilder::new(self.scaler.clone(), min_time_steps)
    }
}

fn load_classifier(path: &Path) -> SequenceClassifier {
    if !path.exists() {
        warn!("No model found at {}. Using untrained model.", path.display());
        return SequenceClassifier::untrained();
    }
    match CropHealthLstm::load(path, FEATURE_COUNT) {
        Ok(network) => {
            info!("Model loaded from {}", path.display());
            SequenceClassifier::new(network)
        }
        Err(e) => {
            warn!("Failed to load model from {}: {}. Using untrained model.", path.display(), e);
            SequenceClassifier::untrained()
        }
    }
}

fn load_scaler(path: &Path) -> Option<StandardScaler> {
    if !path.exists() {
        warn!("No scaler found at {}. Using identity scaling.", path.display());
        return None;
    }
    match StandardScaler::load(path) {
        Ok(scaler) => {
            info!("Scaler loaded from {}", path.display());
            Some(scaler)
        }
        Err(e) => {
            warn!("Failed to load scaler from {}: {}. Using identity scaling.", path.display(), e);
            None
        }
    }
}
