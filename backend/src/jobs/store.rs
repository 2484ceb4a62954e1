use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use shared::JobStatus;
use tokio::sync::RwLock;

use super::model::{JobRecord, JobUpdate, can_transition};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Job already exists: {0}")]
    Conflict(String),
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("Job store backend error: {0}")]
    Backend(String),
    #[error("Serde JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable home of job records. Updates are partial merges.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError>;

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StoreError>;

    async fn get(&self, job_id: &str) -> Result<JobRecord, StoreError>;

    /// Records of one owner ordered by `start_date`.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>, StoreError>;
}

/// Applies `update` to `record` if it keeps the lifecycle moving forward.
pub fn merge_update(record: &mut JobRecord, update: JobUpdate) -> Result<(), StoreError> {
    let from = record.status;
    let allowed = match update.status {
        Some(to) => can_transition(from, to),
        None => !from.is_terminal(),
    };
    if !allowed {
        return Err(StoreError::InvalidTransition {
            job_id: record.job_id.clone(),
            from,
            to: update.status.unwrap_or(from),
        });
    }
    record.apply(update);
    Ok(())
}

pub fn sort_for_listing(records: &mut [JobRecord]) {
    records.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then(a.created_at.cmp(&b.created_at))
    });
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.job_id) {
            return Err(StoreError::Conflict(record.job_id));
        }
        debug!("Storing job {} for owner {}", record.job_id, record.owner_id);
        jobs.insert(record.job_id.clone(), record);
        Ok(())
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        merge_update(record, update)?;
        Ok(record.clone())
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|record| record.owner_id == owner_id)
            .cloned()
            .collect();
        sort_for_listing(&mut records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::tests::request;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use shared::{JobError, JobErrorKind};

    fn record_starting(owner: &str, month: u32) -> JobRecord {
        let mut req = request();
        req.start_date = NaiveDate::from_ymd_opt(2024, month, 1).unwrap();
        JobRecord::new(owner, req)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryJobStore::new();
        let record = record_starting("alice", 1);
        store.create(record.clone()).await.unwrap();

        assert_eq!(store.get(&record.job_id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict() {
        let store = InMemoryJobStore::new();
        let record = record_starting("alice", 1);
        store.create(record.clone()).await.unwrap();

        assert_matches!(store.create(record).await, Err(StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        assert_matches!(store.get("missing").await, Err(StoreError::NotFound(id)) if id == "missing");
        assert_matches!(
            store.update("missing", JobUpdate::processing()).await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn lifecycle_cannot_skip_or_reenter_states() {
        let store = InMemoryJobStore::new();
        let record = record_starting("alice", 1);
        store.create(record.clone()).await.unwrap();
        let failure = JobError::new(JobErrorKind::Internal, "x");

        assert_matches!(
            store.update(&record.job_id, JobUpdate::failed(failure.clone())).await,
            Err(StoreError::InvalidTransition { from: JobStatus::Pending, to: JobStatus::Failed, .. })
        );
        store.update(&record.job_id, JobUpdate::processing()).await.unwrap();
        store.update(&record.job_id, JobUpdate::failed(failure)).await.unwrap();
        assert_matches!(
            store.update(&record.job_id, JobUpdate::processing()).await,
            Err(StoreError::InvalidTransition { .. })
        );
        assert_matches!(
            store.update(&record.job_id, JobUpdate::default()).await,
            Err(StoreError::InvalidTransition { .. })
        );
    }

    #[tokio::test]
    async fn listing_filters_by_owner_and_orders_by_start_date() {
        let store = InMemoryJobStore::new();
        for (owner, month) in [("alice", 3), ("bob", 1), ("alice", 1), ("alice", 2)] {
            store.create(record_starting(owner, month)).await.unwrap();
        }

        let listed = store.list_by_owner("alice").await.unwrap();
        let months: Vec<u32> = listed
            .iter()
            .map(|r| chrono::Datelike::month(&r.start_date))
            .collect();
        assert_eq!(months, vec![1, 2, 3]);
        assert!(listed.iter().all(|r| r.owner_id == "alice"));
        assert!(store.list_by_owner("carol").await.unwrap().is_empty());
    }
}
