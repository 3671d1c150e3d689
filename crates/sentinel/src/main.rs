//! Sentinel CLI - block-window eligibility monitor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use notify::Notifier;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentinel::report::{self, EntitySummary, SummaryReport};
use sentinel::{
    ConfigOverrides, EntityStore, FileStore, MonitorConfig, MonitorScheduler, RpcLedgerClient,
    TickTrigger,
};

/// Sentinel - alert when monitored entities stay eligible for too many blocks.
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Block-window eligibility monitor")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that override the configuration file.
#[derive(Args)]
struct OverrideArgs {
    /// Ledger JSON-RPC endpoint
    #[arg(long, global = true, env = "SENTINEL_RPC_URL")]
    rpc_url: Option<String>,

    /// Eligibility checker contract address
    #[arg(long, global = true, env = "SENTINEL_CHECKER_ADDRESS")]
    checker_address: Option<String>,

    /// Directory for persisted entity state
    #[arg(long, global = true, env = "SENTINEL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Consecutive eligible blocks before alerting
    #[arg(long, global = true, env = "SENTINEL_ALERT_THRESHOLD")]
    alert_threshold: Option<u64>,

    /// Maximum blocks scanned per tick
    #[arg(long, global = true, env = "SENTINEL_MAX_WINDOW")]
    max_window: Option<u64>,

    /// Seconds between ticks
    #[arg(long, global = true, env = "SENTINEL_POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Port for the HTTP control server
    #[arg(long, global = true, env = "SENTINEL_HTTP_PORT")]
    http_port: Option<u16>,

    /// Slack incoming webhook URL
    #[arg(long, global = true, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    slack_webhook_url: Option<String>,

    /// Discord webhook URL
    #[arg(long, global = true, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    discord_webhook_url: Option<String>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            rpc_url: args.rpc_url,
            checker_address: args.checker_address,
            state_dir: args.state_dir,
            alert_threshold: args.alert_threshold,
            max_window: args.max_window,
            poll_interval_secs: args.poll_interval_secs,
            http_port: args.http_port,
            slack_webhook_url: args.slack_webhook_url,
            discord_webhook_url: args.discord_webhook_url,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until interrupted
    Run,

    /// Run one forced check and exit
    Check,

    /// Print persisted entity state
    Status {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Send the summary report through the configured channels
    Summary,

    /// Validate the configuration and exit
    ValidateConfig,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sentinel=debug,notify=debug,info")
        } else {
            EnvFilter::new("sentinel=info,notify=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn load_config(path: Option<&Path>, overrides: OverrideArgs) -> Result<MonitorConfig> {
    let config = MonitorConfig::load(path)?
        .with_overrides(ConfigOverrides::from(overrides));
    config.validate()?;
    Ok(config)
}

fn notifier_for(config: &MonitorConfig) -> Notifier {
    Notifier::from_webhooks(
        config.notifications.slack_webhook_url.clone(),
        config.notifications.discord_webhook_url.clone(),
    )
}

fn build_scheduler(config: MonitorConfig, cancel: CancellationToken) -> Result<Arc<MonitorScheduler>> {
    config.validate_ledger()?;

    let ledger = RpcLedgerClient::new(
        config.rpc_url.clone(),
        config.checker_address.clone(),
        config.action_topic.clone(),
        config.request_timeout(),
    )
    .context("Failed to create ledger client")?;
    let store = FileStore::new(&config.state_dir);
    let notifier = notifier_for(&config);

    info!(
        rpc_url = %config.rpc_url,
        checker = %config.checker_address,
        state_dir = %config.state_dir.display(),
        channels = notifier.channel_count(),
        discovery = config.discovery_mode(),
        "Monitor configured"
    );

    Ok(Arc::new(MonitorScheduler::new(
        config,
        Arc::new(ledger),
        Arc::new(store),
        Arc::new(notifier),
        cancel,
    )))
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, using Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// First signal cancels `cancel`; a second one exits immediately.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing current block");
        cancel.cancel();

        wait_for_signal().await;
        warn!("Second shutdown signal, exiting now");
        std::process::exit(130);
    });
}

async fn run(config: MonitorConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let http_port = config.http_port;
    let scheduler = build_scheduler(config, cancel.clone())?;

    let server = http_port.map(|port| {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = sentinel::server::serve(scheduler, port, cancel).await {
                error!(error = %e, port, "HTTP control server failed");
            }
        })
    });

    match scheduler.initialize().await {
        Ok(()) => scheduler.run().await,
        Err(sentinel::SentinelError::ShuttingDown) => {
            info!("Shutdown during initialization");
            scheduler.shutdown().await;
        }
        Err(e) => {
            cancel.cancel();
            return Err(e).context("Monitor initialization failed");
        }
    }

    if let Some(server) = server {
        if let Err(e) = server.await {
            warn!(error = %e, "HTTP server task panicked");
        }
    }

    info!("Sentinel shutdown complete");
    Ok(())
}

async fn check_once(config: MonitorConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let scheduler = build_scheduler(config, cancel)?;
    scheduler
        .initialize()
        .await
        .context("Monitor initialization failed")?;

    let report = scheduler.tick(TickTrigger::Manual).await?;
    scheduler.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn print_status(config: &MonitorConfig, format: OutputFormat) -> Result<()> {
    let store = FileStore::new(&config.state_dir);
    let entities = store.list().await?;

    match format {
        OutputFormat::Text => {
            print!(
                "{}",
                SummaryReport::from_entities(&entities, config.alert_threshold).render()
            );
        }
        OutputFormat::Json => {
            let summaries: Vec<EntitySummary> = entities.iter().map(EntitySummary::from).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
    }
    Ok(())
}

async fn summary(config: &MonitorConfig) -> Result<()> {
    let store = FileStore::new(&config.state_dir);
    let notifier = notifier_for(config);

    let report = report::send_summary(&store, &notifier, config.alert_threshold).await?;
    print!("{}", report.render());
    Ok(())
}

fn validate_config(config: &MonitorConfig) -> Result<()> {
    config.validate_ledger()?;

    println!("Configuration OK");
    println!("  rpc_url:          {}", config.rpc_url);
    println!("  checker_address:  {}", config.checker_address);
    if config.discovery_mode() {
        println!("  entities:         discovered from ledger");
    } else {
        println!("  entities:         {}", config.entities.len());
    }
    println!("  alert_threshold:  {}", config.alert_threshold);
    println!("  max_window:       {}", config.max_window);
    println!("  poll_interval:    {}s", config.poll_interval_secs);
    println!("  state_dir:        {}", config.state_dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = load_config(cli.config.as_deref(), cli.overrides)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Check => check_once(config).await,
        Commands::Status { format } => print_status(&config, format).await,
        Commands::Summary => summary(&config).await,
        Commands::ValidateConfig => validate_config(&config),
    }
}
