//! promobot-robot: affiliate promotion service
//!
//! Fetches marketplace listings, keeps the approved catalogue in SQLite and
//! posts templated offers to WhatsApp groups through an Evolution API gateway.
//! Runs are triggered and monitored over the HTTP API.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use promobot_robot::config::{resolve_config, CliOverrides, RobotConfig};
use promobot_robot::services::sources::{AmazonSource, MercadoLivreSource};
use promobot_robot::services::{
    Enricher, EvolutionClient, OrchestratorOptions, QualityGate, RateLimiter, RobotDeps, RobotOrchestrator,
    SourceFetcher, SystemClock,
};
use promobot_robot::AppState;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "promobot-robot")]
#[command(about = "Affiliate promotion robot for WhatsApp groups")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "PROMOBOT_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cli = CliOverrides {
        port: args.port,
        database: args.database,
    };
    let config = resolve_config(args.config.as_deref(), &cli).context("Configuration refused")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting promobot-robot");
    info!(
        "Version: {} (build {}, {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database: {}", config.database.path.display());

    let db_pool = promobot_robot::db::init_database_pool(&config.database.path).await?;
    info!("Database connection established");

    // One limiter shared by every source keeps the politeness budget global
    let rate_limiter = Arc::new(RateLimiter::from_config(&config.fetcher));
    let timeout = Duration::from_secs(config.fetcher.timeout_secs);
    let mercadolivre = MercadoLivreSource::new(
        config.fetcher.mercadolivre_api_url.clone(),
        &config.fetcher.user_agent,
        timeout,
        Arc::clone(&rate_limiter),
    )?;
    let amazon = AmazonSource::new(
        config.fetcher.amazon_url.clone(),
        &config.fetcher.user_agent,
        timeout,
        Arc::clone(&rate_limiter),
    )?;
    let fetcher = SourceFetcher::new(config.affiliate.clone())
        .with_source(Arc::new(mercadolivre))
        .with_source(Arc::new(amazon));
    info!(platforms = ?fetcher.platforms(), "Listing sources registered");

    let transport = EvolutionClient::from_config(&config.gateway)?;
    info!(instance = %config.gateway.instance, "Messaging gateway client ready");

    let robot_config = RobotConfig::try_from(&config.robot)?;
    let orchestrator = Arc::new(RobotOrchestrator::new(
        RobotDeps {
            db: db_pool.clone(),
            fetcher: Arc::new(fetcher),
            enricher: Enricher::new(QualityGate::from(&config.quality)),
            transport: Arc::new(transport),
            clock: Arc::new(SystemClock),
        },
        robot_config,
        OrchestratorOptions {
            history_capacity: config.robot.history_capacity,
            stop_grace: Duration::from_millis(config.robot.stop_grace_ms),
        },
    ));

    let state = AppState::new(db_pool, Arc::clone(&orchestrator));
    let app = promobot_robot::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator))
        .await?;

    info!("promobot-robot stopped");
    Ok(())
}

/// Resolve on Ctrl+C, stopping any active run first
async fn shutdown_signal(orchestrator: Arc<RobotOrchestrator>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested");
    if orchestrator.stop().await {
        info!("Active robot run stopped");
    }
}
