mod backends;
mod commands;
mod context;
mod tui;
mod ui;

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chandeck_core::config::DashConfig;

use context::AppContext;

const DEFAULT_LOG_FILTER: &str = "info,hyper_util=warn,reqwest=warn";

#[derive(Parser)]
#[command(name = "chandeck")]
#[command(about = "Operator dashboard for remote live-video channels", long_about = None)]
struct Cli {
    /// Server address, overrides the persisted choice
    #[arg(long, global = true)]
    server: Option<String>,

    /// Config file, overrides discovery
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in demo backend instead of a real server
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard (default)
    Tui,
    /// Print every channel once
    List,
    /// Start a channel
    Start { channel: String },
    /// Stop a channel
    Stop { channel: String },
    /// Show candidate servers and the persisted choice
    Servers,
}

/// Log to a file; the terminal belongs to the TUI.
fn init_logging(config: &DashConfig) {
    let path = config.log_file.clone().unwrap_or_else(default_log_path);
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(log_file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
}

fn default_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|d| d.join("chandeck"))
        .unwrap_or_else(std::env::temp_dir)
        .join("chandeck.log")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ctx = AppContext::load(cli.config.as_deref(), cli.server.clone(), cli.demo)
        .context("loading configuration")?;
    init_logging(&ctx.config);
    tracing::info!(
        "chandeck starting (config: {:?}, demo: {})",
        ctx.config_path,
        cli.demo
    );

    match cli.command {
        Some(Commands::List) => commands::run_list(&ctx).await,
        Some(Commands::Start { channel }) => commands::run_control(&ctx, &channel, true).await,
        Some(Commands::Stop { channel }) => commands::run_control(&ctx, &channel, false).await,
        Some(Commands::Servers) => commands::run_servers(&ctx),
        Some(Commands::Tui) | None => tui::run_tui(ctx).await,
    }
}
