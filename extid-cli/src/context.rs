//! Build the registry service from resolved settings

use crate::cli::Backend;
use crate::config::Settings;
use crate::error::{CliError, CliResult};
use extid_core::RecordStore;
use extid_registry::{AllocationRegistry, ExternalIdService, FileRecordStore};
use std::sync::Arc;

async fn build_store(settings: &Settings) -> CliResult<Arc<dyn RecordStore>> {
    match settings.backend {
        Backend::File => {
            tracing::debug!(path = %settings.storage_path.display(), "Using file record store");
            Ok(Arc::new(FileRecordStore::new(settings.storage_path.clone())))
        }
        Backend::Dynamodb => build_dynamodb_store(settings).await,
    }
}

#[cfg(feature = "aws")]
async fn build_dynamodb_store(settings: &Settings) -> CliResult<Arc<dyn RecordStore>> {
    use extid_storage_aws::{DynamoDbConfig, DynamoDbRecordStore};

    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    let dynamo = &settings.dynamodb;
    let store = DynamoDbRecordStore::new(
        &sdk_config,
        DynamoDbConfig {
            table_name: dynamo.table_name.clone(),
            region: dynamo.region.clone(),
            endpoint: dynamo.endpoint.clone(),
            timeout_ms: dynamo.timeout_ms,
            ..Default::default()
        },
    )
    .await
    .map_err(|e| CliError::Config(e.to_string()))?;
    tracing::debug!(table = %dynamo.table_name, "Using DynamoDB record store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "aws"))]
async fn build_dynamodb_store(_settings: &Settings) -> CliResult<Arc<dyn RecordStore>> {
    Err(CliError::Config(
        "the dynamodb backend requires the 'aws' feature".to_string(),
    ))
}

pub async fn build_service(settings: &Settings) -> CliResult<ExternalIdService> {
    let store = build_store(settings).await?;
    let registry = AllocationRegistry::new(store, settings.registry.clone());
    Ok(ExternalIdService::new(registry))
}
