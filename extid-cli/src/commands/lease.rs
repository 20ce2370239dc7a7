//! Single-ID lifecycle commands: reserve, assign, unassign
//!
//! These act on the registry directly; study policies only gate enrollment.

use crate::error::CliResult;
use extid_registry::ExternalIdService;

pub async fn reserve(service: &ExternalIdService, study: &str, id: &str) -> CliResult<()> {
    let registry = service.registry();
    registry.reserve(study, id).await?;
    println!(
        "Reserved '{id}' in study '{study}' for {}ms",
        registry.config().lease_duration_ms
    );
    Ok(())
}

pub async fn assign(
    service: &ExternalIdService,
    study: &str,
    id: &str,
    health_code: &str,
) -> CliResult<()> {
    service.registry().assign(study, id, health_code).await?;
    println!("Assigned '{id}' in study '{study}'");
    Ok(())
}

pub async fn unassign(service: &ExternalIdService, study: &str, id: &str) -> CliResult<()> {
    service.registry().unassign(study, id).await?;
    println!("Released '{id}' in study '{study}'");
    Ok(())
}
