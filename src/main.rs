use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use callout_lib::settings::{default_settings_path, load_settings, save_settings_to};

#[derive(Parser, Debug)]
#[command(name = "voice-callout")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the settings file (JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Service origin, overrides the settings file and environment
    #[arg(long = "base-url", value_name = "URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the effective settings to the settings file
    InitConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout belongs to the session
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref());
    if let Some(url) = cli.base_url {
        settings.base_url = url;
    }

    if let Some(Commands::InitConfig) = cli.command {
        let Some(path) = cli.config.or_else(default_settings_path) else {
            log::error!("Could not determine config directory; pass --config");
            return ExitCode::FAILURE;
        };
        return match save_settings_to(&path, &settings) {
            Ok(()) => {
                println!("Wrote settings to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    match callout_lib::run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
