use crate::cli::ListFormat;
use crate::error::CliResult;
use comfy_table::{ContentArrangement, Table};
use extid_registry::ExternalIdPage;

/// Render one page of IDs.
pub fn format_page(page: &ExternalIdPage, format: ListFormat) -> CliResult<String> {
    match format {
        ListFormat::Json => Ok(serde_json::to_string_pretty(page)?),
        ListFormat::Table => Ok(format_page_table(page)),
    }
}

fn format_page_table(page: &ExternalIdPage) -> String {
    if page.items.is_empty() {
        return format!("No external IDs found (total: {}).", page.total);
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["EXTERNAL ID", "ASSIGNED"]);
    for item in &page.items {
        table.add_row(vec![
            item.identifier.clone(),
            if item.assigned { "yes" } else { "no" }.to_string(),
        ]);
    }

    let mut out = format!("{table}\n{} of {} shown", page.items.len(), page.total);
    if let Some(next) = &page.offset_key {
        out.push_str(&format!("; next page: --offset-key {next}"));
    }
    out
}
