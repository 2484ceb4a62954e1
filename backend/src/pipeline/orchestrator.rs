use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{error, info, warn};
use shared::{JobError, JobErrorKind, JobStatus};

use crate::features::{FeatureBuilder, FeatureError};
use crate::jobs::{JobRecord, JobStore, JobUpdate, StoreError};
use crate::model::{ClassifierError, SequenceClassifier};
use crate::providers::{ProviderError, TileProvider, TimeSeriesProvider};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Time series provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("Classifier rejected input: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Job store failed: {0}")]
    Store(#[from] StoreError),
    #[error("Analysis run panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            PipelineError::Provider(_) => JobErrorKind::ProviderFailure,
            PipelineError::Classifier(ClassifierError::ShapeMismatch { .. }) => {
                JobErrorKind::ShapeMismatch
            }
            PipelineError::Store(_) => JobErrorKind::StoreFailure,
            PipelineError::Panicked(_) => JobErrorKind::Internal,
        }
    }
}

impl From<&PipelineError> for JobError {
    fn from(err: &PipelineError) -> Self {
        JobError::new(err.kind(), err.to_string())
    }
}

pub fn insufficient_data_warning(err: &FeatureError) -> String {
    format!("Insufficient Sentinel-1 data for this AOI and date range. {err}.")
}

const PROCESSING_WRITE_ATTEMPTS: usize = 2;
const PROCESSING_RETRY_DELAY: Duration = Duration::from_millis(200);

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

/// Drives one job from `pending` to a terminal state.
pub struct AnalysisOrchestrator {
    store: Arc<dyn JobStore>,
    time_series: Arc<dyn TimeSeriesProvider>,
    tiles: Arc<dyn TileProvider>,
    classifier: Arc<SequenceClassifier>,
    builder: FeatureBuilder,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        time_series: Arc<dyn TimeSeriesProvider>,
        tiles: Arc<dyn TileProvider>,
        classifier: Arc<SequenceClassifier>,
        builder: FeatureBuilder,
    ) -> Self {
        Self {
            store,
            time_series,
            tiles,
            classifier,
            builder,
        }
    }

    /// Runs the job to completion. Never returns an error: every outcome,
    /// including a panic inside the run, ends up in the stored record.
    pub async fn run(&self, record: JobRecord) {
        let job_id = record.job_id.clone();
        if record.status != JobStatus::Pending {
            warn!("Job {} is {}, not pending; skipping run", job_id, record.status);
            return;
        }
        if !self.mark_processing(&job_id).await {
            return;
        }

        let update = match AssertUnwindSafe(self.analyze(&record)).catch_unwind().await {
            Ok(Ok(update)) => update,
            Ok(Err(e)) => {
                error!("Job {} failed: {}", job_id, e);
                JobUpdate::failed(JobError::from(&e))
            }
            Err(payload) => {
                let e = PipelineError::Panicked(panic_message(payload));
                error!("Job {} failed: {}", job_id, e);
                JobUpdate::failed(JobError::from(&e))
            }
        };
        self.finish(&job_id, update).await;
    }

    /// Returns whether this run owns the job. A job whose `processing` write
    /// keeps failing stays `pending`; `pending -> failed` is not a transition.
    async fn mark_processing(&self, job_id: &str) -> bool {
        for attempt in 1..=PROCESSING_WRITE_ATTEMPTS {
            match self.store.update(job_id, JobUpdate::processing()).await {
                Ok(_) => {
                    info!("Job {} processing", job_id);
                    return true;
                }
                Err(StoreError::InvalidTransition { from, .. }) => {
                    warn!("Job {} already left pending ({}); skipping run", job_id, from);
                    return false;
                }
                Err(e) if attempt < PROCESSING_WRITE_ATTEMPTS => {
                    warn!("Job {} could not be marked processing, retrying: {}", job_id, e);
                    tokio::time::sleep(PROCESSING_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(
                        "Job {} could not be marked processing after {} attempts, left pending: {}",
                        job_id, attempt, e
                    );
                }
            }
        }
        false
    }

    async fn analyze(&self, record: &JobRecord) -> Result<JobUpdate, PipelineError> {
        let frame = self
            .time_series
            .fetch(&record.aoi, record.start_date, record.end_date)
            .await?;
        info!("Job {}: {} composite time steps", record.job_id, frame.len());

        let sequence = match self.builder.build(&frame) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!("Job {}: {}", record.job_id, e);
                return Ok(JobUpdate::insufficient(
                    insufficient_data_warning(&e),
                    frame.display_rows(),
                ));
            }
        };

        let prediction = self.classifier.classify(sequence.view())?;
        info!(
            "Job {}: {} ({}%)",
            record.job_id, prediction.label, prediction.confidence
        );

        let map_tile_url = match self
            .tiles
            .visualization_tile(&record.aoi, record.start_date, record.end_date)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Job {}: map tile unavailable: {}", record.job_id, e);
                None
            }
        };

        Ok(JobUpdate::completed(
            prediction,
            frame.display_rows(),
            map_tile_url,
        ))
    }

    async fn finish(&self, job_id: &str, update: JobUpdate) {
        let target = update.status;
        let e = match self.store.update(job_id, update).await {
            Ok(record) => {
                info!("Job {} {}", job_id, record.status);
                return;
            }
            Err(e) => e,
        };
        error!("Job {}: terminal write failed: {}", job_id, e);
        if target == Some(JobStatus::Failed) {
            return;
        }
        let fallback = JobUpdate::failed(JobError::from(&PipelineError::Store(e)));
        if let Err(e) = self.store.update(job_id, fallback).await {
            error!("Job {}: could not record failure: {}", job_id, e);
        }
    }
}
