//! Prediction worker service
//!
//! Serves the public league API and runs the daily select / predict / open /
//! close / raffle / archive lifecycle for NBA, EPL and LaLiga.

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use prediction_worker::health::HealthState;
use prediction_worker::{router, AppState, Config, Scheduler, Services};

#[tokio::main]
async fn main() -> Result<()> {
    // Local development convenience; deployments set real env vars
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prediction_worker=info".parse()?),
        )
        .init();

    info!("Prediction worker v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let http_port = config.http_port;
    let run_once = config.run_once;
    let scheduler_enabled = config.scheduler_enabled;
    let tick_interval = Duration::from_secs(config.tick_interval_seconds);

    let services = Arc::new(Services::connect(config).await?);
    let health = HealthState::new();
    let scheduler = Arc::new(Scheduler::new(services.clone(), health.clone(), tick_interval));

    // One-shot mode (manual trigger): run every worker once and exit
    if run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        let report = scheduler.tick_once().await;
        for outcome in &report.outcomes {
            info!(
                "{} {} {}: {:?} ({})",
                outcome.league, outcome.action, outcome.for_date, outcome.status, outcome.detail
            );
        }
        if report.errors > 0 {
            error!("One-shot run finished with {} errors", report.errors);
            return Err(anyhow::anyhow!("{} worker actions failed", report.errors));
        }
        return Ok(());
    }

    let app: Router = router(AppState {
        services: services.clone(),
        scheduler: scheduler.clone(),
        health,
    });

    let addr = format!("0.0.0.0:{}", http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP API listening on {}", addr);

    if scheduler_enabled {
        scheduler.start().await;
    } else {
        info!("Scheduler disabled (SCHEDULER_ENABLED=false); workers run on request only");
    }

    let shutdown_scheduler = scheduler.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutting down...");
            shutdown_scheduler.stop().await;
        })
        .await?;

    Ok(())
}
