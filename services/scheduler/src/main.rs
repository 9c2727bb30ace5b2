//! Runner scheduler
//!
//! Receives GitHub `workflow_job` webhooks, starts one Koyeb runner per
//! `(region, instance type)` a job asks for, and deletes runners that stay
//! idle for longer than the configured TTL.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use runner_fleet::{FleetClient, KoyebClient};
use runner_scheduler::{
    api,
    config::{Args, Config},
    orchestrator::Scheduler,
    state::AppState,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_args(Args::parse())?);

    // Prefer RUST_LOG, fall back to LOG_LEVEL.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting runner scheduler");
    info!(
        listen_addr = %config.listen_addr,
        mode = ?config.mode,
        ttl_secs = config.runners_ttl.as_secs(),
        label_prefix = %config.label_prefix,
        teardown_on_completed = config.teardown_on_completed,
        "Configuration loaded"
    );
    if config.disable_auth {
        warn!("Webhook signature verification is DISABLED. Anyone can start runners on this account.");
    }

    let fleet: Arc<dyn FleetClient> =
        Arc::new(KoyebClient::new(&config.koyeb_api_url, &config.koyeb_token)?);

    let scheduler = match Scheduler::bootstrap(Arc::clone(&config), fleet).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %e, "Failed to load existing runners");
            return Err(e.into());
        }
    };

    let app = api::create_router(AppState::new(Arc::clone(&config), scheduler));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Runner scheduler shutdown complete");
    Ok(())
}
