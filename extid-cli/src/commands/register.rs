use crate::error::{CliError, CliResult};
use extid_registry::ExternalIdService;
use std::path::Path;

/// Parse an ID file: one ID per line, blank lines and `#` comments skipped.
fn parse_id_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn run(
    service: &ExternalIdService,
    study: &str,
    ids: &[String],
    file: Option<&Path>,
) -> CliResult<()> {
    let mut all_ids = ids.to_vec();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Input(format!("failed to read {}: {e}", path.display())))?;
        all_ids.extend(parse_id_lines(&content));
    }
    if all_ids.is_empty() {
        return Err(CliError::Usage(
            "no external IDs provided; pass IDs or use --file".to_string(),
        ));
    }

    let batch_size = service.registry().config().max_batch_size;
    let mut registered = 0;
    let mut skipped = 0;
    for chunk in all_ids.chunks(batch_size) {
        let outcome = service.add_external_ids(study, chunk).await?;
        registered += outcome.registered.len();
        skipped += outcome.skipped.len();
    }

    println!("Registered {registered} external ID(s) in study '{study}' ({skipped} already existed)");
    Ok(())
}
