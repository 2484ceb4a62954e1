use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Health class produced by the classifier. The declaration order is the
/// class index order of the model output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum HealthLabel {
    Healthy,
    Normal,
    Stressed,
}

impl HealthLabel {
    pub const COUNT: usize = 3;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(HealthLabel::Healthy),
            1 => Some(HealthLabel::Normal),
            2 => Some(HealthLabel::Stressed),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One elementary acquisition period, backscatter in decibel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawObservationRow {
    pub period_start: NaiveDate,
    pub vv_mean: f64,
    pub vh_mean: f64,
}

/// One fixed-period composite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRow {
    #[serde(alias = "date")]
    pub period_start: NaiveDate,
    pub rvi_mean: Option<f64>,
    pub rvi_median: Option<f64>,
    pub rvi_std: Option<f64>,
    pub vv_mean: Option<f64>,
    pub vh_mean: Option<f64>,
    pub vv_vh_ratio: Option<f64>,
}

impl FeatureRow {
    pub fn is_empty(&self) -> bool {
        self.rvi_mean.is_none()
            && self.rvi_median.is_none()
            && self.rvi_std.is_none()
            && self.vv_mean.is_none()
            && self.vh_mean.is_none()
            && self.vv_vh_ratio.is_none()
    }

    /// Replaces every non-finite value with null.
    pub fn sanitized(mut self) -> Self {
        for value in self.values_mut() {
            *value = value.filter(|v| v.is_finite());
        }
        self
    }

    /// Rounds every present value to `decimals` places for display.
    pub fn rounded(mut self, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        for value in self.values_mut() {
            *value = value.map(|v| (v * factor).round() / factor);
        }
        self
    }

    fn values_mut(&mut self) -> [&mut Option<f64>; 6] {
        [
            &mut self.rvi_mean,
            &mut self.rvi_median,
            &mut self.rvi_std,
            &mut self.vv_mean,
            &mut self.vh_mean,
            &mut self.vv_vh_ratio,
        ]
    }
}

/// Class distribution as percentages (0-100, one decimal place).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub healthy: f64,
    pub normal: f64,
    pub stressed: f64,
    pub confidence: f64,
    pub label: HealthLabel,
}

impl Prediction {
    pub fn percentage(&self, label: HealthLabel) -> f64 {
        match label {
            HealthLabel::Healthy => self.healthy,
            HealthLabel::Normal => self.normal,
            HealthLabel::Stressed => self.stressed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobErrorKind {
    ProviderFailure,
    ShapeMismatch,
    StoreFailure,
    Internal,
}

/// Failure carried by a `failed` job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// GeoJSON Polygon or Feature, passed through to the providers untouched.
    #[serde(alias = "aoi")]
    pub aoi_geojson: serde_json::Value,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub crop_type: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: String,
    pub status: JobStatus,
    pub prediction: Option<Prediction>,
    pub time_series: Option<Vec<FeatureRow>>,
    pub map_tile_url: Option<String>,
    pub warning: Option<String>,
    pub error: Option<JobError>,
}
