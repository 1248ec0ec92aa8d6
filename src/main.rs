//! SmartDNS console - follow logs, metrics and the remote terminal of a
//! SmartDNS server from the command line.
//!
//! This is the main binary entry point. See the `smartdns_console` library
//! for the streaming core.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smartdns_console::commands::{self, logs::LogsArgs, Services};
use smartdns_console::{Config, LogKind, LogLevel};

#[derive(Parser)]
#[command(name = "smartdns-console")]
#[command(version)]
#[command(about = "Streaming log, metrics and terminal console for SmartDNS")]
struct Cli {
    /// Server URL (overrides config and SMARTDNS_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,
    /// Bearer token (overrides config and SMARTDNS_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the run log (or the audit log with --audit)
    Logs {
        /// Follow the audit log instead of the run log
        #[arg(long)]
        audit: bool,
        /// Server log level to request (debug, info, notice, warn, error, fatal)
        #[arg(long)]
        level: Option<LogLevel>,
        /// Copy the collected lines to the clipboard on exit
        #[arg(long)]
        copy: bool,
    },
    /// Show live metrics
    Metrics,
    /// Open the interactive terminal (Ctrl-] detaches)
    Term,
    /// Check that the configured login is accepted
    Check,
    /// Print the effective configuration
    Config,
}

fn init_logging() -> Result<()> {
    // Log to a file so the terminal view is not disturbed.
    let log_path = match std::env::var("SMARTDNS_LOG_FILE") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => Config::config_dir()?.join("smartdns-console.log"),
    };
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file at {}", log_path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }

    log::info!("smartdns-console v{} against {}", env!("CARGO_PKG_VERSION"), config.server_url);

    match cli.command {
        Commands::Logs { audit, level, copy } => {
            let services = Services::connect(&config).await?;
            let args = LogsArgs {
                kind: if audit { LogKind::AuditLog } else { LogKind::RunLog },
                level,
                copy_on_exit: copy,
            };
            commands::logs::run(&services, config.log_stream_options(), args).await?;
            services.report_expired_login();
        }
        Commands::Metrics => {
            let services = Services::connect(&config).await?;
            commands::metrics::run(&services, config.reconnect_delay()).await?;
        }
        Commands::Term => {
            let services = Services::connect(&config).await?;
            commands::term::run(&services, config.terminal_options()).await?;
            services.report_expired_login();
        }
        Commands::Check => commands::check::run(&config).await?,
        Commands::Config => {
            let mut shown = config.clone();
            if shown.token.is_some() {
                shown.token = Some("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}
