//! Demand-gen optimizer daemon.
//!
//! Launches Performance Max campaigns from a business profile and keeps
//! live campaigns tuned on two schedules until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use demand_connectors::{GoogleAdsClient, GuardedCaller, OpenAiClient, RetryPolicy};
use demand_core::config::{AppConfig, MetricsConfig};
use demand_core::types::BusinessProfile;
use demand_optimizer::{
    CampaignGenerator, CampaignLauncher, OptimizationEngine, OptimizationScheduler,
    OptimizationStore, ScoreWeights,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "demand-gen")]
#[command(about = "Performance Max campaign launcher and optimizer")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "DEMAND_GEN_CONFIG")]
    config: Option<PathBuf>,

    /// Node identifier (overrides config)
    #[arg(long, env = "DEMAND_GEN__NODE_ID")]
    node_id: Option<String>,

    /// Seconds between realtime optimization cycles (overrides config)
    #[arg(long)]
    realtime_interval_secs: Option<u64>,

    /// Seconds between insight cycles (overrides config)
    #[arg(long)]
    insight_interval_secs: Option<u64>,

    /// Prometheus exporter port (overrides config)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Run one realtime and one insight cycle, then exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Launch a campaign from a business profile JSON file, then exit
    #[arg(long, value_name = "PROFILE")]
    launch: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "demand_gen=info,demand_optimizer=info,demand_connectors=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Demand-gen optimizer starting up");

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(secs) = cli.realtime_interval_secs {
        config.optimizer.realtime_interval_secs = secs;
    }
    if let Some(secs) = cli.insight_interval_secs {
        config.optimizer.insight_interval_secs = secs;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        customer_id = %config.google_ads.customer_id,
        model = %config.openai.model,
        realtime_secs = config.optimizer.realtime_interval_secs,
        insight_secs = config.optimizer.insight_interval_secs,
        "Configuration loaded"
    );

    if let Err(e) = start_metrics(&config.metrics) {
        error!(error = %e, "Failed to start metrics exporter");
    }

    let cancel = CancellationToken::new();
    let call_timeout = Duration::from_millis(config.retry.call_timeout_ms);
    let retry = RetryPolicy::from(&config.retry);

    let ads = Arc::new(GoogleAdsClient::new(config.google_ads.clone(), call_timeout)?);
    let model = Arc::new(OpenAiClient::new(config.openai.clone(), call_timeout)?);
    let ads_caller = Arc::new(GuardedCaller::new(
        "google_ads",
        retry.clone(),
        call_timeout,
        config.circuit_breaker.clone(),
        cancel.clone(),
    ));
    let model_caller = Arc::new(GuardedCaller::new(
        "openai",
        retry,
        call_timeout,
        config.circuit_breaker.clone(),
        cancel.clone(),
    ));

    let store = Arc::new(OptimizationStore::new(config.optimizer.action_history));
    let generator = Arc::new(CampaignGenerator::new(
        model,
        model_caller,
        store.clone(),
        config.optimizer.asset_score_threshold,
    ));

    if let Some(path) = cli.launch {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let profile: BusinessProfile =
            serde_json::from_str(&raw).context("invalid business profile")?;
        let launcher = CampaignLauncher::new(
            ads,
            ads_caller,
            generator,
            store,
            config.optimizer.clone(),
        );
        let campaign = launcher.launch(&profile).await?;
        println!("{}", serde_json::to_string_pretty(&campaign)?);
        return Ok(());
    }

    let engine = Arc::new(OptimizationEngine::new(
        ads,
        ads_caller,
        generator,
        store,
        config.optimizer.clone(),
        ScoreWeights::from(&config.scoring),
    ));

    if cli.once {
        let realtime = engine.run_realtime_cycle().await?;
        let insight = engine.run_insight_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&[realtime, insight])?);
        return Ok(());
    }

    let mut scheduler = OptimizationScheduler::new(engine, &config.optimizer, cancel);
    scheduler.start();
    info!("Demand-gen optimizer is running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.shutdown().await;

    Ok(())
}

fn start_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(port = config.port, "Metrics exporter started");
    Ok(())
}
