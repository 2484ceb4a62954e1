use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{AnalysisRequest, AnalysisResult, FeatureRow, JobError, JobStatus, Prediction};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub aoi: serde_json::Value,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub crop_type: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub time_series: Option<Vec<FeatureRow>>,
    #[serde(default)]
    pub map_tile_url: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(owner_id: impl Into<String>, request: AnalysisRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            aoi: request.aoi_geojson,
            start_date: request.start_date,
            end_date: request.end_date,
            crop_type: request.crop_type,
            season: request.season,
            prediction: None,
            time_series: None,
            map_tile_url: None,
            warning: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges the fields present in `update`. Inputs and ownership are never
    /// touched.
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(prediction) = update.prediction {
            self.prediction = prediction;
        }
        if let Some(time_series) = update.time_series {
            self.time_series = time_series;
        }
        if let Some(map_tile_url) = update.map_tile_url {
            self.map_tile_url = map_tile_url;
        }
        if let Some(warning) = update.warning {
            self.warning = warning;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        self.updated_at = Utc::now();
    }

    pub fn to_result(&self) -> AnalysisResult {
        AnalysisResult {
            job_id: self.job_id.clone(),
            status: self.status,
            prediction: self.prediction.clone(),
            time_series: self.time_series.clone(),
            map_tile_url: self.map_tile_url.clone(),
            warning: self.warning.clone(),
            error: self.error.clone(),
        }
    }
}

/// `pending -> processing -> {completed, failed}`, nothing else.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Processing)
            | (JobStatus::Processing, JobStatus::Completed)
            | (JobStatus::Processing, JobStatus::Failed)
    )
}

/// Partial update of a job record. The outer `Option` says whether the field
/// is written at all, the inner one is the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub prediction: Option<Option<Prediction>>,
    pub time_series: Option<Option<Vec<FeatureRow>>>,
    pub map_tile_url: Option<Option<String>>,
    pub warning: Option<Option<String>>,
    pub error: Option<Option<JobError>>,
}

impl JobUpdate {
    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            ..Default::default()
        }
    }

    pub fn completed(
        prediction: Prediction,
        time_series: Vec<FeatureRow>,
        map_tile_url: Option<String>,
    ) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            prediction: Some(Some(prediction)),
            time_series: Some(Some(time_series)),
            map_tile_url: Some(map_tile_url),
            warning: Some(None),
            error: Some(None),
        }
    }

    /// Completed without a prediction because too few composites exist.
    pub fn insufficient(warning: String, time_series: Vec<FeatureRow>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            prediction: Some(None),
            time_series: Some(Some(time_series)),
            map_tile_url: Some(None),
            warning: Some(Some(warning)),
            error: Some(None),
        }
    }

    /// Terminal failure; clears every result field of the run.
    pub fn failed(error: JobError) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            prediction: Some(None),
            time_series: Some(None),
            map_tile_url: Some(None),
            warning: Some(None),
            error: Some(Some(error)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shared::{HealthLabel, JobErrorKind};

    pub(crate) fn request() -> AnalysisRequest {
        AnalysisRequest {
            aoi_geojson: serde_json::json!({"type": "Polygon", "coordinates": []}),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            crop_type: Some("rice".into()),
            season: None,
        }
    }

    fn prediction() -> Prediction {
        Prediction {
            healthy: 70.0,
            normal: 20.0,
            stressed: 10.0,
            confidence: 70.0,
            label: HealthLabel::Healthy,
        }
    }

    #[test]
    fn new_records_start_pending_with_unique_ids() {
        let a = JobRecord::new("owner-a", request());
        let b = JobRecord::new("owner-a", request());
        assert_eq!(a.status, JobStatus::Pending);
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.crop_type.as_deref(), Some("rice"));
        assert!(a.prediction.is_none() && a.error.is_none() && a.warning.is_none());
    }

    #[test]
    fn transitions_only_move_forward() {
        assert!(can_transition(JobStatus::Pending, JobStatus::Processing));
        assert!(can_transition(JobStatus::Processing, JobStatus::Completed));
        assert!(can_transition(JobStatus::Processing, JobStatus::Failed));
        assert!(!can_transition(JobStatus::Pending, JobStatus::Completed));
        assert!(!can_transition(JobStatus::Completed, JobStatus::Processing));
        assert!(!can_transition(JobStatus::Failed, JobStatus::Failed));
    }

    #[test]
    fn failed_update_discards_earlier_results() {
        let mut record = JobRecord::new("owner-a", request());
        record.apply(JobUpdate::processing());
        record.prediction = Some(prediction());
        record.map_tile_url = Some("https://tiles/{z}/{x}/{y}".into());

        record.apply(JobUpdate::failed(JobError::new(JobErrorKind::ProviderFailure, "boom")));

        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.prediction.is_none());
        assert!(record.map_tile_url.is_none());
        assert!(record.time_series.is_none());
        assert_eq!(record.error.as_ref().map(|e| e.message.as_str()), Some("boom"));
    }

    #[test]
    fn partial_update_leaves_other_fields() {
        let mut record = JobRecord::new("owner-a", request());
        let before = record.clone();
        record.apply(JobUpdate::processing());

        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.owner_id, before.owner_id);
        assert_eq!(record.start_date, before.start_date);
        assert!(record.updated_at >= before.updated_at);
    }

    #[test]
    fn result_view_mirrors_record() {
        let mut record = JobRecord::new("owner-a", request());
        record.apply(JobUpdate::processing());
        record.apply(JobUpdate::completed(prediction(), vec![], None));

        let result = record.to_result();
        assert_eq!(result.job_id, record.job_id);
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.prediction, Some(prediction()));
        assert_eq!(result.time_series, Some(vec![]));
    }
}
