use crate::error::{CliError, CliResult};
use extid_registry::ExternalIdService;

pub async fn run(
    service: &ExternalIdService,
    study: &str,
    ids: &[String],
    force: bool,
) -> CliResult<()> {
    if !force {
        return Err(CliError::Usage(format!(
            "use --force to confirm deletion of {} external ID(s) from study '{study}'",
            ids.len()
        )));
    }

    service.delete_external_ids(study, ids).await?;
    println!("Deleted {} external ID(s) from study '{study}'", ids.len());
    Ok(())
}
