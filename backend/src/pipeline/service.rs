use std::sync::Arc;

use log::{info, warn};
use shared::AnalysisRequest;

use super::orchestrator::AnalysisOrchestrator;
use crate::error::ServiceError;
use crate::jobs::{JobRecord, JobStore};

/// Caller-facing job API: accepts requests, dispatches runs, answers polls.
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn JobStore>,
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn JobStore>, orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// Persists a pending job and returns its id without waiting for the run.
    pub async fn submit_job(
        &self,
        owner_id: &str,
        request: AnalysisRequest,
    ) -> Result<String, ServiceError> {
        if request.end_date <= request.start_date {
            return Err(ServiceError::InvalidRequest(format!(
                "end_date {} must be after start_date {}",
                request.end_date, request.start_date
            )));
        }
        let record = JobRecord::new(owner_id, request);
        let job_id = record.job_id.clone();
        self.store.create(record.clone()).await?;
        info!("Job {} created for owner {}", job_id, owner_id);

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(record).await });
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: &str, owner_id: &str) -> Result<JobRecord, ServiceError> {
        let record = self.store.get(job_id).await?;
        if record.owner_id != owner_id {
            warn!("Owner {} denied access to job {}", owner_id, job_id);
            return Err(ServiceError::Unauthorized(job_id.to_string()));
        }
        Ok(record)
    }

    pub async fn list_jobs(&self, owner_id: &str) -> Result<Vec<JobRecord>, ServiceError> {
        Ok(self.store.list_by_owner(owner_id).await?)
    }
}
