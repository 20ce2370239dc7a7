//! DynamoDB record store
//!
//! Provides `DynamoDbRecordStore`, a [`RecordStore`] keeping one item per
//! external identifier. Leases and bindings rely on `PutItem` with a
//! `ConditionExpression`; listing uses `Query` on the study partition.

mod expr;
mod retry;
pub mod schema;

use crate::error::{AwsStorageError, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, PutRequest, Select, WriteRequest};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::timeout::TimeoutConfig;
use expr::ExpressionBuilder;
pub use retry::BatchRetryConfig;
use extid_core::{
    BatchFailure, Condition, ExternalIdRecord, PutOutcome, RecordKey, RecordQuery, RecordStore,
    StoreError,
};
use schema::*;
use std::collections::HashMap;
use std::time::Duration;

type Item = HashMap<String, AttributeValue>;

/// DynamoDB record store configuration
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// DynamoDB table name
    pub table_name: String,
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Resend schedule for items BatchWriteItem leaves unprocessed
    pub batch_retry: BatchRetryConfig,
}

/// DynamoDB-based record store
#[derive(Clone)]
pub struct DynamoDbRecordStore {
    client: Client,
    table_name: String,
    batch_retry: BatchRetryConfig,
}

impl std::fmt::Debug for DynamoDbRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbRecordStore")
            .field("table_name", &self.table_name)
            .finish()
    }
}

/// Map an SDK failure, keeping throttling and transport failures distinguishable
fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> AwsStorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let transport = matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    );
    let throttled = matches!(
        err.code(),
        Some("ProvisionedThroughputExceededException")
            | Some("ThrottlingException")
            | Some("RequestLimitExceeded")
    );
    let msg = format!("DynamoDB {} failed: {}", operation, DisplayErrorContext(&err));
    if transport {
        AwsStorageError::io(msg)
    } else if throttled {
        AwsStorageError::throttled(msg)
    } else {
        AwsStorageError::dynamodb(msg)
    }
}

fn key_item(study_id: &str, identifier: &str) -> Item {
    HashMap::from([
        (
            ATTR_STUDY_ID.to_string(),
            AttributeValue::S(study_id.to_string()),
        ),
        (
            ATTR_IDENTIFIER.to_string(),
            AttributeValue::S(identifier.to_string()),
        ),
    ])
}

/// Convert a record to a DynamoDB item. Unset fields are omitted.
fn record_to_item(record: &ExternalIdRecord) -> Item {
    let mut item = key_item(&record.study_id, &record.identifier);
    if let Some(health_code) = &record.health_code {
        item.insert(
            ATTR_HEALTH_CODE.to_string(),
            AttributeValue::S(health_code.clone()),
        );
    }
    if let Some(reservation) = record.reservation {
        item.insert(
            ATTR_RESERVATION.to_string(),
            AttributeValue::N(reservation.to_string()),
        );
    }
    item
}

fn string_attr(item: &Item, attr: &str) -> Option<String> {
    item.get(attr).and_then(|v| v.as_s().ok()).cloned()
}

/// Convert a DynamoDB item to a record
fn item_to_record(item: &Item) -> Result<ExternalIdRecord> {
    let study_id = string_attr(item, ATTR_STUDY_ID)
        .ok_or_else(|| AwsStorageError::malformed_item(format!("missing {}", ATTR_STUDY_ID)))?;
    let identifier = string_attr(item, ATTR_IDENTIFIER)
        .ok_or_else(|| AwsStorageError::malformed_item(format!("missing {}", ATTR_IDENTIFIER)))?;
    let reservation = match item.get(ATTR_RESERVATION) {
        None => None,
        Some(value) => {
            let raw = value.as_n().map_err(|_| {
                AwsStorageError::malformed_item(format!("{} is not a number", ATTR_RESERVATION))
            })?;
            let millis: i64 = raw.parse().map_err(|_| {
                AwsStorageError::malformed_item(format!("{} = {}", ATTR_RESERVATION, raw))
            })?;
            // 0 is the legacy "no lease" value
            (millis != 0).then_some(millis)
        }
    };

    Ok(ExternalIdRecord {
        study_id,
        identifier,
        health_code: string_attr(item, ATTR_HEALTH_CODE),
        reservation,
    })
}

/// Recover the key of a write request returned as unprocessed
fn request_key(request: &WriteRequest) -> Option<RecordKey> {
    let item = match (request.put_request(), request.delete_request()) {
        (Some(put), _) => put.item(),
        (None, Some(delete)) => delete.key(),
        (None, None) => return None,
    };
    Some(RecordKey::new(
        string_attr(item, ATTR_STUDY_ID)?,
        string_attr(item, ATTR_IDENTIFIER)?,
    ))
}

impl DynamoDbRecordStore {
    /// Create a new DynamoDB record store
    ///
    /// Configuration:
    /// - `region`: Override SDK region (uses SDK default if not specified)
    /// - `endpoint`: Override the service endpoint
    /// - `timeout_ms`: Operation timeout in milliseconds
    pub async fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Result<Self> {
        if config.table_name.trim().is_empty() {
            return Err(AwsStorageError::invalid_config("table_name is required"));
        }

        // Inherit HTTP client, retry config and credentials from the SdkConfig
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region_str) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region_str));
        }

        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        let client = Client::from_conf(builder.build());
        tracing::debug!(table = %config.table_name, "DynamoDB record store created");

        Ok(Self {
            client,
            table_name: config.table_name,
            batch_retry: config.batch_retry,
        })
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client, table_name: String) -> Self {
        Self {
            client,
            table_name,
            batch_retry: BatchRetryConfig::default(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Check if a PutItem error is a conditional check failure
    fn is_put_conditional_check_failed(
        err: &SdkError<aws_sdk_dynamodb::operation::put_item::PutItemError>,
    ) -> bool {
        use aws_sdk_dynamodb::operation::put_item::PutItemError;

        match err {
            SdkError::ServiceError(service_err) => {
                matches!(
                    service_err.err(),
                    PutItemError::ConditionalCheckFailedException(_)
                )
            }
            _ => false,
        }
    }

    /// Send BatchWriteItem in chunks, reporting every item that wasn't written.
    ///
    /// Unprocessed items are resent per `batch_retry`. A call that fails
    /// outright reports everything it carried.
    async fn batch_write(&self, requests: Vec<(RecordKey, WriteRequest)>) -> Vec<BatchFailure> {
        let mut failures = Vec::new();
        for chunk in requests.chunks(MAX_BATCH_WRITE_ITEMS) {
            let writes: Vec<WriteRequest> = chunk.iter().map(|(_, w)| w.clone()).collect();
            let result = retry::write_with_retry(&self.batch_retry, writes, |writes| {
                let request = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, writes);
                let table_name = self.table_name.clone();
                async move {
                    match request.send().await {
                        Ok(response) => Ok(response
                            .unprocessed_items()
                            .and_then(|items| items.get(&table_name))
                            .cloned()
                            .unwrap_or_default()),
                        Err(e) => Err(sdk_error("BatchWriteItem", e)),
                    }
                }
            })
            .await;

            if result.pending.is_empty() {
                continue;
            }
            let reason = match &result.error {
                Some(e) => e.to_string(),
                None => "unprocessed by DynamoDB after retries".to_string(),
            };
            tracing::warn!(items = result.pending.len(), error = %reason, "Batch write incomplete");
            failures.extend(
                result
                    .pending
                    .iter()
                    .filter_map(request_key)
                    .map(|key| BatchFailure::new(key, reason.clone())),
            );
        }
        failures
    }
}

#[async_trait]
impl RecordStore for DynamoDbRecordStore {
    async fn get(&self, key: &RecordKey) -> extid_core::Result<Option<ExternalIdRecord>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_item(&key.study_id, &key.identifier)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| sdk_error("GetItem", e))?;

        match response.item() {
            Some(item) => Ok(Some(item_to_record(item)?)),
            None => Ok(None),
        }
    }

    async fn put_if(
        &self,
        record: &ExternalIdRecord,
        expected: &Condition,
    ) -> extid_core::Result<PutOutcome> {
        let mut exprs = ExpressionBuilder::new();
        let condition = exprs.condition(expected);

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .set_condition_expression(condition)
            .set_expression_attribute_names(exprs.names())
            .set_expression_attribute_values(exprs.values())
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Written),
            Err(e) if Self::is_put_conditional_check_failed(&e) => Ok(PutOutcome::ConditionFailed),
            Err(e) => Err(sdk_error("PutItem", e).into()),
        }
    }

    async fn put(&self, record: &ExternalIdRecord) -> extid_core::Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(|e| sdk_error("PutItem", e))?;
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> extid_core::Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_item(&key.study_id, &key.identifier)))
            .send()
            .await
            .map_err(|e| sdk_error("DeleteItem", e))?;
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> extid_core::Result<Vec<ExternalIdRecord>> {
        let mut exprs = ExpressionBuilder::new();
        let key_condition = exprs.key_condition(&query.study_id, query.id_prefix.as_deref());
        let filter = query.filter.as_ref().and_then(|f| exprs.condition(f));
        let names = exprs.names();
        let values = exprs.values();

        let limit = query.limit.unwrap_or(usize::MAX);
        let mut records = Vec::new();
        let mut start_key = query
            .exclusive_start
            .as_deref()
            .map(|start| key_item(&query.study_id, start));

        // Limit applies before FilterExpression, so keep paging until enough
        // filtered items are collected
        while records.len() < limit {
            let remaining = i32::try_from(limit - records.len()).unwrap_or(i32::MAX);
            let response = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression(&key_condition)
                .set_filter_expression(filter.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .set_exclusive_start_key(start_key.take())
                .limit(remaining)
                .send()
                .await
                .map_err(|e| sdk_error("Query", e))?;

            for item in response.items() {
                records.push(item_to_record(item)?);
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    async fn count(&self, query: &RecordQuery) -> extid_core::Result<usize> {
        let mut exprs = ExpressionBuilder::new();
        let key_condition = exprs.key_condition(&query.study_id, query.id_prefix.as_deref());
        let filter = query.filter.as_ref().and_then(|f| exprs.condition(f));
        let names = exprs.names();
        let values = exprs.values();

        let mut total = 0usize;
        let mut start_key = None;
        loop {
            let response = self
                .client
                .query()
                .table_name(&self.table_name)
                .select(Select::Count)
                .key_condition_expression(&key_condition)
                .set_filter_expression(filter.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| sdk_error("Query", e))?;

            total += usize::try_from(response.count()).unwrap_or(0);

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(total)
    }

    async fn batch_put(&self, records: &[ExternalIdRecord]) -> extid_core::Result<Vec<BatchFailure>> {
        let mut requests = Vec::with_capacity(records.len());
        for record in records {
            let put = PutRequest::builder()
                .set_item(Some(record_to_item(record)))
                .build()
                .map_err(|e| StoreError::backend(format!("Invalid put request: {}", e)))?;
            requests.push((
                record.key(),
                WriteRequest::builder().put_request(put).build(),
            ));
        }
        Ok(self.batch_write(requests).await)
    }

    async fn batch_delete(&self, keys: &[RecordKey]) -> extid_core::Result<Vec<BatchFailure>> {
        let mut requests = Vec::with_capacity(keys.len());
        for key in keys {
            let delete = DeleteRequest::builder()
                .set_key(Some(key_item(&key.study_id, &key.identifier)))
                .build()
                .map_err(|e| StoreError::backend(format!("Invalid delete request: {}", e)))?;
            requests.push((
                key.clone(),
                WriteRequest::builder().delete_request(delete).build(),
            ));
        }
        Ok(self.batch_write(requests).await)
    }
}
