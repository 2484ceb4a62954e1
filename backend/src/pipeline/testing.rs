//! Stub collaborators for pipeline and route tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use shared::{FeatureRow, JobStatus};

use super::orchestrator::AnalysisOrchestrator;
use crate::features::{FeatureBuilder, FeatureFrame};
use crate::features::builder::DEFAULT_MIN_TIME_STEPS;
use crate::jobs::{InMemoryJobStore, JobRecord, JobStore, JobUpdate, StoreError};
use crate::model::lstm::tests::zero_state_dict;
use crate::model::{CropHealthLstm, SequenceClassifier};
use crate::providers::{ProviderError, TileProvider, TimeSeriesProvider};

pub(crate) fn rows(count: usize, start: NaiveDate) -> Vec<FeatureRow> {
    (0..count)
        .map(|i| FeatureRow {
            period_start: start + Days::new(10 * i as u64),
            rvi_mean: Some(0.4 + 0.01 * i as f64),
            rvi_median: Some(0.41),
            rvi_std: Some(0.05),
            vv_mean: Some(-11.0),
            vh_mean: Some(-17.5),
            vv_vh_ratio: Some(6.5),
        })
        .collect()
}

pub(crate) enum StubSeries {
    Rows(usize),
    Fail(&'static str),
    Panic,
}

#[async_trait]
impl TimeSeriesProvider for StubSeries {
    async fn fetch(
        &self,
        _aoi: &serde_json::Value,
        start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<FeatureFrame, ProviderError> {
        match self {
            StubSeries::Rows(count) => Ok(FeatureFrame::new(rows(*count, start_date))?),
            StubSeries::Fail(message) => Err(ProviderError::Unavailable(message.to_string())),
            StubSeries::Panic => panic!("observation backend exploded"),
        }
    }
}

pub(crate) struct StubTiles {
    pub fail: bool,
}

#[async_trait]
impl TileProvider for StubTiles {
    async fn visualization_tile(
        &self,
        _aoi: &serde_json::Value,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<String, ProviderError> {
        if self.fail {
            Err(ProviderError::Status {
                status: 503,
                body: "tile quota exceeded".into(),
            })
        } else {
            Ok("https://tiles.example/{z}/{x}/{y}".into())
        }
    }
}

/// In-memory store that remembers every status it persisted per job.
#[derive(Default)]
pub(crate) struct RecordingStore {
    inner: InMemoryJobStore,
    statuses: Mutex<HashMap<String, Vec<JobStatus>>>,
}

impl RecordingStore {
    pub fn statuses(&self, job_id: &str) -> Vec<JobStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, job_id: &str, status: JobStatus) {
        self.statuses
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push(status);
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        let (job_id, status) = (record.job_id.clone(), record.status);
        self.inner.create(record).await?;
        self.record(&job_id, status);
        Ok(())
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let written = self.inner.update(job_id, update.clone()).await?;
        if let Some(status) = update.status {
            self.record(job_id, status);
        }
        Ok(written)
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        self.inner.get(job_id).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        self.inner.list_by_owner(owner_id).await
    }
}

/// Zero-weight network whose output bias favours `Healthy`.
pub(crate) fn classifier() -> SequenceClassifier {
    let mut dict = zero_state_dict(5);
    if let Some(bias) = dict.0.get_mut("classifier.3.bias") {
        bias.data = vec![2.0, 0.5, -1.0];
    }
    SequenceClassifier::new(CropHealthLstm::from_state_dict(&dict, 5).unwrap())
}

pub(crate) fn orchestrator(
    store: Arc<dyn JobStore>,
    series: StubSeries,
    tiles: StubTiles,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(
        store,
        Arc::new(series),
        Arc::new(tiles),
        Arc::new(classifier()),
        FeatureBuilder::new(None, DEFAULT_MIN_TIME_STEPS),
    )
}

/// Polls until the job reaches a terminal state.
pub(crate) async fn wait_for_terminal(store: &dyn JobStore, job_id: &str) -> JobRecord {
    for _ in 0..500 {
        let record = store.get(job_id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}
