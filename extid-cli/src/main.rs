mod cli;
mod commands;
mod config;
mod context;
mod error;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use error::exit_with_error;

fn init_tracing(cli: &Cli) {
    // --quiet → "off"; --verbose → RUST_LOG or "info"; default → "off" so
    // RUST_LOG doesn't leak log lines into user-facing output.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("off")
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    if let Commands::Init = cli.command {
        return commands::init::run();
    }

    let extid_dir = config::require_extid_dir(cli.config.as_deref())?;
    let file_config = config::load_file_config(&extid_dir)?;
    let settings = config::resolve_settings(&cli, &extid_dir, file_config)?;
    let service = context::build_service(&settings).await?;

    match cli.command {
        Commands::Init => Ok(()),

        Commands::Register { study, ids, file } => {
            commands::register::run(&service, &study, &ids, file.as_deref()).await
        }

        Commands::Delete { study, ids, force } => {
            commands::delete::run(&service, &study, &ids, force).await
        }

        Commands::List {
            study,
            offset_key,
            page_size,
            id_filter,
            assigned,
            format,
        } => {
            let args = commands::list::ListArgs {
                offset_key,
                page_size,
                id_filter,
                assigned,
                format,
            };
            commands::list::run(&service, &study, args).await
        }

        Commands::Reserve { study, id } => commands::lease::reserve(&service, &study, &id).await,

        Commands::Assign {
            study,
            id,
            health_code,
        } => commands::lease::assign(&service, &study, &id, &health_code).await,

        Commands::Unassign { study, id } => {
            commands::lease::unassign(&service, &study, &id).await
        }
    }
}
