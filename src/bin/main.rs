use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use reel_scheduler::{
    Clock, DEFAULT_GRAPH_BASE, DEFAULT_GRAPH_VERSION, DEFAULT_MANIFEST_PATH,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_TIMEZONE, GraphApiConfig,
    PublisherConfig, SystemClock, create_orchestrator,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reel_scheduler=info,reqwest=warn";

#[derive(Parser)]
#[command(name = "reel-scheduler")]
#[command(about = "Publish scheduled reels from a CSV manifest")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every due reel and update the manifest (default)
    Run,
    /// List the reels that are due now without publishing anything
    Due,
}

#[derive(Args)]
struct Settings {
    /// Instagram business account id
    #[arg(long, env = "IG_USER_ID")]
    ig_user_id: String,
    /// Graph API access token
    #[arg(long, env = "IG_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,
    #[arg(long, env = "MANIFEST_PATH", default_value = DEFAULT_MANIFEST_PATH)]
    manifest: PathBuf,
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: u64,
    #[arg(long, env = "POLL_TIMEOUT_SECONDS", default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    poll_timeout: u64,
    #[arg(long, env = "GRAPH_VERSION", default_value = DEFAULT_GRAPH_VERSION)]
    graph_version: String,
    #[arg(long, env = "GRAPH_API_BASE", default_value = DEFAULT_GRAPH_BASE)]
    graph_base: String,
    /// IANA timezone the manifest schedule is written in
    #[arg(long, env = "SCHEDULE_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    timezone: String,
    /// Number of reels allowed to be in flight at once
    #[arg(long, env = "MAX_CONCURRENT_PUBLISHES", default_value_t = 1)]
    max_concurrent: usize,
}

impl Settings {
    fn into_config(self) -> Result<PublisherConfig> {
        let graph = GraphApiConfig {
            base_url: self.graph_base,
            version: self.graph_version,
            ig_user_id: self.ig_user_id,
            access_token: self.access_token,
        };

        Ok(PublisherConfig::resolve(
            graph,
            self.manifest,
            self.poll_interval,
            self.poll_timeout,
            &self.timezone,
            self.max_concurrent,
        )?)
    }
}

/// Log filter from a `RUST_LOG`-style spec, falling back to the crate at
/// info and reqwest at warn when the spec is unset or does not parse.
fn log_filter(spec: Option<&str>) -> EnvFilter {
    spec.filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
    let spec = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(spec.as_deref()))
        .init();

    let cli = Cli::parse();
    let config = cli.settings.into_config()?;
    info!(
        "Using manifest {} (schedule timezone {})",
        config.manifest_path.display(),
        config.timezone
    );

    let orchestrator = create_orchestrator(&config)?;
    let now = SystemClock::new(config.timezone).now();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = orchestrator.run(&now).await?;
            info!(
                due = summary.due_count,
                published = summary.updated_count,
                failed = summary.failed_count,
                skipped = summary.skipped_count,
                "Run complete"
            );
        }
        Commands::Due => {
            let due = orchestrator.preview(&now)?;
            if due.is_empty() {
                println!("Nothing due at {}.", now.format("%Y-%m-%d %H:%M %Z"));
                return Ok(());
            }

            println!("{:<6} {:<22} {}", "LINE", "SCHEDULED", "VIDEO");
            println!("{}", "-".repeat(80));
            for entry in due {
                println!(
                    "{:<6} {:<22} {}",
                    entry.index + 2,
                    entry.scheduled_at.format("%Y-%m-%d %H:%M %Z"),
                    entry.video_url
                );
            }
        }
    }

    Ok(())
}
