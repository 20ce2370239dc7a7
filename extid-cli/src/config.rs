//! `.extid/` discovery and settings resolution
//!
//! Settings come from `.extid/config.toml`:
//!
//! ```toml
//! [store]
//! backend = "file"            # or "dynamodb"
//! path = "storage"            # file backend, relative to .extid/
//! table_name = "external-ids" # dynamodb backend
//!
//! [registry]
//! lease_duration_ms = 30000
//! ```
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags
//! 2. Environment variables (`EXTID_*`, bound to the same flags)
//! 3. Config file
//! 4. Hardcoded defaults

use crate::cli::{Backend, Cli};
use crate::error::{CliError, CliResult};
use extid_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const EXTID_DIR: &str = ".extid";
const STORAGE_DIR: &str = "storage";
const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_TABLE_NAME: &str = "external-ids";

const CONFIG_TEMPLATE: &str = r#"# External ID registry configuration

[store]
backend = "file"
path = "storage"
# table_name = "external-ids"
# region = "us-east-1"
# endpoint = "http://localhost:4566"
# timeout_ms = 5000

[registry]
lease_duration_ms = 30000
max_batch_size = 100
min_page_size = 1
max_page_size = 100
default_page_size = 50
"#;

/// Top-level config file structure. Absent sections mean "not set in file".
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ExtidFileConfig {
    #[serde(default)]
    pub store: Option<StoreFileConfig>,

    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

/// The `[store]` section
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct StoreFileConfig {
    pub backend: Option<Backend>,
    pub path: Option<String>,
    pub table_name: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// DynamoDB connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoSettings {
    pub table_name: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub storage_path: PathBuf,
    pub dynamodb: DynamoSettings,
    pub registry: RegistryConfig,
}

/// Walk up from `start` looking for a `.extid/` directory.
fn find_extid_dir_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(EXTID_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Resolve a `--config` override (file or directory) to a `.extid/` directory.
fn resolve_config_override(p: &Path) -> CliResult<PathBuf> {
    let resolved = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if resolved.is_file() {
        return resolved
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                CliError::Config(format!("cannot determine parent of: {}", resolved.display()))
            });
    }

    if resolved.is_dir() {
        return Ok(resolved);
    }

    Err(CliError::Config(format!(
        "config path does not exist: {}",
        p.display()
    )))
}

/// Require a `.extid/` directory, from `--config` or by walking up from cwd.
pub fn require_extid_dir(config_override: Option<&Path>) -> CliResult<PathBuf> {
    if let Some(p) = config_override {
        return resolve_config_override(p);
    }
    let cwd = std::env::current_dir()?;
    find_extid_dir_from(&cwd).ok_or(CliError::NoExtidDir)
}

/// Create `.extid/` in the current directory with a default config.
/// Existing files are left alone.
pub fn init_extid_dir() -> CliResult<PathBuf> {
    let extid_dir = std::env::current_dir()?.join(EXTID_DIR);
    let storage_dir = extid_dir.join(STORAGE_DIR);

    fs::create_dir_all(&storage_dir).map_err(|e| {
        CliError::Config(format!("failed to create {}: {e}", storage_dir.display()))
    })?;

    let config_path = extid_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        fs::write(&config_path, CONFIG_TEMPLATE).map_err(|e| {
            CliError::Config(format!("failed to create {}: {e}", config_path.display()))
        })?;
    }

    Ok(extid_dir)
}

/// Read `.extid/config.toml`; a missing file is an empty config.
pub fn load_file_config(extid_dir: &Path) -> CliResult<ExtidFileConfig> {
    let path = extid_dir.join(CONFIG_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ExtidFileConfig::default()),
        Err(e) => {
            return Err(CliError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };
    toml::from_str(&content)
        .map_err(|e| CliError::Config(format!("invalid {}: {e}", path.display())))
}

/// Merge flags/env over the file config over defaults.
pub fn resolve_settings(
    cli: &Cli,
    extid_dir: &Path,
    file: ExtidFileConfig,
) -> CliResult<Settings> {
    let store = file.store.unwrap_or_default();

    let mut registry = file.registry.unwrap_or_default();
    if let Some(lease_ms) = cli.lease_duration_ms {
        registry.lease_duration_ms = lease_ms;
    }
    registry
        .validate()
        .map_err(|e| CliError::Config(format!("invalid [registry] settings: {e}")))?;

    let storage_path = match store.path {
        Some(path) if Path::new(&path).is_absolute() => PathBuf::from(path),
        Some(path) => extid_dir.join(path),
        None => extid_dir.join(STORAGE_DIR),
    };

    let settings = Settings {
        backend: cli.backend.or(store.backend).unwrap_or(Backend::File),
        storage_path,
        dynamodb: DynamoSettings {
            table_name: cli
                .table
                .clone()
                .or(store.table_name)
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            region: store.region,
            endpoint: cli.endpoint.clone().or(store.endpoint),
            timeout_ms: store.timeout_ms,
        },
        registry,
    };
    tracing::debug!(?settings, "Resolved settings");
    Ok(settings)
}
