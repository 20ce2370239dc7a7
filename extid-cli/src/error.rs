use colored::Colorize;
use extid_registry::RegistryError;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
#[allow(dead_code)]
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
/// The ID is leased or bound; retry with another one.
pub const EXIT_CONFLICT: i32 = 3;

/// Unified error type for CLI operations.
pub enum CliError {
    /// Error from the registry or its store.
    Registry(RegistryError),
    /// Configuration / init issues.
    Config(String),
    /// Bad file path, unreadable input.
    Input(String),
    /// External ID not registered.
    NotFound(String),
    /// External ID already leased or assigned.
    Conflict(String),
    /// `.extid/` directory not found.
    NoExtidDir,
    /// Argument / usage errors.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Registry(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Config(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Input(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::NotFound(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Conflict(msg) => write!(
                f,
                "{} {msg}\n  {} pick another external ID, or wait for the lease to expire",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
            CliError::NoExtidDir => write!(
                f,
                "{} no .extid/ directory found\n  {} run 'extid init' to initialize",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
            CliError::Usage(msg) => write!(f, "{} {msg}", "error:".red().bold()),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { .. } => CliError::NotFound(e.to_string()),
            RegistryError::Conflict { .. } => CliError::Conflict(e.to_string()),
            RegistryError::BadRequest(msg) => CliError::Usage(msg),
            other => CliError::Registry(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Input(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Input(format!("JSON error: {e}"))
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    let code = match &err {
        CliError::Usage(_) => EXIT_USAGE,
        CliError::Conflict(_) => EXIT_CONFLICT,
        _ => EXIT_ERROR,
    };
    process::exit(code)
}

pub type CliResult<T> = std::result::Result<T, CliError>;
