use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use log::{debug, error, info, warn};

use super::model::{JobRecord, JobUpdate};
use super::store::{JobStore, StoreError, merge_update, sort_for_listing};

/// One item per job keyed by `id`. Lookup attributes are stored flat, the
/// full record as JSON under `record`.
#[derive(Clone)]
pub struct DynamoDbJobStore {
    client: Client,
    table_name: String,
}

impl DynamoDbJobStore {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    pub async fn from_env(table_name: String) -> Self {
        info!("Initializing DynamoDB job store with table: {}", table_name);
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(Client::new(&config), table_name)
    }

    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let attributes = record_to_attributes(record)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attributes))
            .send()
            .await
            .map_err(|e| {
                error!("AWS SDK error during put_item for job {}: {:?}", record.job_id, e);
                StoreError::Backend(e.to_string())
            })?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for DynamoDbJobStore {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        info!("Creating job {} in table: {}", record.job_id, self.table_name);
        let attributes = record_to_attributes(&record)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attributes))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                let conditional = e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception());
                if conditional {
                    StoreError::Conflict(record.job_id.clone())
                } else {
                    error!("AWS SDK error during put_item for job {}: {:?}", record.job_id, e);
                    StoreError::Backend(e.to_string())
                }
            })?;
        info!("Job {} successfully created in DynamoDB", record.job_id);
        Ok(())
    }

    // Read-merge-write. Only the orchestrator of a job writes to it, so there
    // is no competing writer for the same item.
    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut record = self.get(job_id).await?;
        merge_update(&mut record, update)?;
        self.put(&record).await?;
        debug!("Job {} updated to {}", job_id, record.status);
        Ok(record)
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(job_id.to_string()))
            .send()
            .await
            .map_err(|e| {
                error!("AWS SDK error during get_item for job {}: {:?}", job_id, e);
                StoreError::Backend(e.to_string())
            })?;
        match response.item {
            Some(item) => attributes_to_record(&item),
            None => {
                warn!("Job {} not found in DynamoDB", job_id);
                Err(StoreError::NotFound(job_id.to_string()))
            }
        }
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("owner_id = :owner_id")
                .expression_attribute_values(":owner_id", AttributeValue::S(owner_id.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            for item in result.items() {
                records.push(attributes_to_record(item)?);
            }
            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        sort_for_listing(&mut records);
        Ok(records)
    }
}

fn record_to_attributes(record: &JobRecord) -> Result<HashMap<String, AttributeValue>, StoreError> {
    let mut attributes = HashMap::new();
    attributes.insert("id".to_string(), AttributeValue::S(record.job_id.clone()));
    attributes.insert("owner_id".to_string(), AttributeValue::S(record.owner_id.clone()));
    attributes.insert("status".to_string(), AttributeValue::S(record.status.to_string()));
    attributes.insert(
        "start_date".to_string(),
        AttributeValue::S(record.start_date.to_string()),
    );
    attributes.insert(
        "updated_at".to_string(),
        AttributeValue::S(record.updated_at.to_rfc3339()),
    );
    attributes.insert(
        "record".to_string(),
        AttributeValue::S(serde_json::to_string(record)?),
    );
    Ok(attributes)
}

fn attributes_to_record(attributes: &HashMap<String, AttributeValue>) -> Result<JobRecord, StoreError> {
    let raw = attributes
        .get("record")
        .and_then(|av| av.as_s().ok())
        .ok_or_else(|| StoreError::Backend("Missing record attribute".to_string()))?;
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::tests::request;
    use assert_matches::assert_matches;

    #[test]
    fn attributes_carry_lookup_keys_and_full_record() {
        let record = JobRecord::new("alice", request());
        let attributes = record_to_attributes(&record).unwrap();

        assert_eq!(attributes["id"].as_s().unwrap(), &record.job_id);
        assert_eq!(attributes["owner_id"].as_s().unwrap(), "alice");
        assert_eq!(attributes["status"].as_s().unwrap(), "pending");
        assert_eq!(attributes["start_date"].as_s().unwrap(), "2024-01-01");
        assert_eq!(attributes_to_record(&attributes).unwrap(), record);
    }

    #[test]
    fn item_without_record_is_rejected() {
        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), AttributeValue::S("job".into()));
        assert_matches!(attributes_to_record(&attributes), Err(StoreError::Backend(_)));
    }
}
