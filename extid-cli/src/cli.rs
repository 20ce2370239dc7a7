use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "extid", about = "External ID registry CLI", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to config file or .extid/ directory
    #[arg(long, global = true, env = "EXTID_CONFIG")]
    pub config: Option<PathBuf>,

    /// Record store backend (overrides [store] backend)
    #[arg(long, global = true, env = "EXTID_BACKEND")]
    pub backend: Option<Backend>,

    /// DynamoDB table name (overrides [store] table_name)
    #[arg(long, global = true, env = "EXTID_DYNAMODB_TABLE")]
    pub table: Option<String>,

    /// DynamoDB endpoint override, e.g. for LocalStack
    #[arg(long, global = true, env = "EXTID_DYNAMODB_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Lease duration in milliseconds (overrides [registry] lease_duration_ms)
    #[arg(long, global = true, env = "EXTID_LEASE_DURATION_MS")]
    pub lease_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// JSON documents under .extid/storage
    File,
    /// Amazon DynamoDB
    Dynamodb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a .extid/ directory with a default config
    Init,

    /// Register external IDs for a study (existing IDs are skipped)
    Register {
        /// Study identifier
        study: String,

        /// External IDs to register
        ids: Vec<String>,

        /// Read IDs from a file, one per line
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Delete external IDs from a study
    Delete {
        /// Study identifier
        study: String,

        /// External IDs to delete
        #[arg(required = true)]
        ids: Vec<String>,

        /// Required flag to confirm deletion
        #[arg(long)]
        force: bool,
    },

    /// List a study's external IDs, one page at a time
    List {
        /// Study identifier
        study: String,

        /// Continue after this ID (the offset key printed by the previous page)
        #[arg(long)]
        offset_key: Option<String>,

        /// Page size (defaults to [registry] default_page_size)
        #[arg(long)]
        page_size: Option<usize>,

        /// Only IDs starting with this prefix
        #[arg(long)]
        id_filter: Option<String>,

        /// Only unavailable (true) or claimable (false) IDs
        #[arg(long)]
        assigned: Option<bool>,

        /// Output format
        #[arg(long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },

    /// Take a lease on an external ID
    Reserve {
        /// Study identifier
        study: String,
        /// External ID
        id: String,
    },

    /// Bind an external ID to a participant's health code
    Assign {
        /// Study identifier
        study: String,
        /// External ID
        id: String,
        /// Participant health code
        health_code: String,
    },

    /// Release an external ID (clears binding and lease)
    Unassign {
        /// Study identifier
        study: String,
        /// External ID
        id: String,
    },
}
