use crate::cli::ListFormat;
use crate::error::CliResult;
use crate::output;
use extid_registry::{ExternalIdService, ListOptions};

pub struct ListArgs {
    pub offset_key: Option<String>,
    pub page_size: Option<usize>,
    pub id_filter: Option<String>,
    pub assigned: Option<bool>,
    pub format: ListFormat,
}

pub async fn run(service: &ExternalIdService, study: &str, args: ListArgs) -> CliResult<()> {
    let options = ListOptions {
        offset_key: args.offset_key,
        page_size: args.page_size,
        id_filter: args.id_filter,
        assignment_filter: args.assigned,
    };
    let page = service.list(study, &options).await?;
    println!("{}", output::format_page(&page, args.format)?);
    Ok(())
}
