use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::frame::FEATURE_COUNT;

#[derive(Debug, thiserror::Error)]
pub enum ScalerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Scaler expects {expected} features, artifact has {found}")]
    FeatureCount { expected: usize, found: usize },
}

#[derive(Debug, Serialize, Deserialize)]
struct ScalerArtifact {
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
}

/// Per-feature `(x - mean) / scale` transform fitted at training time.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ScalerError> {
        for len in [mean.len(), scale.len()] {
            if len != FEATURE_COUNT {
                return Err(ScalerError::FeatureCount {
                    expected: FEATURE_COUNT,
                    found: len,
                });
            }
        }
        // A constant feature was fitted with zero variance; leave it unscaled.
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s })
            .collect();
        Ok(Self {
            mean: Array1::from_vec(mean),
            scale: Array1::from_vec(scale),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ScalerError> {
        let raw = fs::read_to_string(path)?;
        let artifact: ScalerArtifact = serde_json::from_str(&raw)?;
        Self::new(artifact.mean, artifact.scale)
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        let mean = self.mean.view().insert_axis(Axis(0));
        let scale = self.scale.view().insert_axis(Axis(0));
        (features - &mean) / &scale
    }
}
