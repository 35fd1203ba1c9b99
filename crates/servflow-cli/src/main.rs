//! Servflow command-line entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod start_commands;
mod validate_commands;

#[derive(Parser)]
#[command(name = "servflow")]
#[command(about = "Servflow - declarative API gateway and workflow engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short = 'v', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server against a folder of API configs
    Start(StartArgs),
    /// Load and schema-validate every YAML config; nonzero exit on any failure
    Validate(ValidateArgs),
    /// Print the generated JSON Schema for ApiConfig
    Schema,
}

#[derive(Args)]
struct StartArgs {
    /// Config folder; defaults to SERVFLOW_CONFIGFOLDERS_APIS
    config_folder: Option<PathBuf>,

    /// Integrations file to load at startup
    #[arg(long)]
    integrations: Option<PathBuf>,

    /// Reload configs when files change
    #[arg(long)]
    watch: bool,

    /// Listen port; defaults to SERVFLOW_PORT or 8080
    #[arg(long)]
    port: Option<u16>,

    /// Expose /debug routes regardless of SERVFLOW_ENV
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct ValidateArgs {
    /// Config folder; defaults to SERVFLOW_CONFIGFOLDERS_APIS
    config_folder: Option<PathBuf>,

    /// Print every file checked, not just failures
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_config_folder(arg: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(folder) = arg {
        return Ok(folder);
    }
    match std::env::var("SERVFLOW_CONFIGFOLDERS_APIS") {
        Ok(folder) if !folder.is_empty() => Ok(PathBuf::from(folder)),
        _ => anyhow::bail!(
            "no config folder given and SERVFLOW_CONFIGFOLDERS_APIS is not set"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Start(args) => {
            let folder = resolve_config_folder(args.config_folder.clone())?;
            start_commands::run(folder, args).await
        }
        Commands::Validate(args) => {
            let folder = resolve_config_folder(args.config_folder.clone())?;
            let failures = validate_commands::run(&folder, args.verbose)?;
            if failures > 0 {
                anyhow::bail!("{failures} config file(s) failed validation");
            }
            Ok(())
        }
        Commands::Schema => {
            let registry = servflow_core::global_actions();
            servflow_actions::register_builtin_actions(registry)?;
            let schema = servflow_config::generate_schema(&registry.action_schemas());
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}
