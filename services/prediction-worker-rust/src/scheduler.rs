//! In-process scheduler for the lifecycle workers.
//!
//! `start` and `stop` are idempotent; the running loop is owned by the
//! scheduler rather than guarded by a global "already started" flag.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::app::Services;
use crate::health::HealthState;
use crate::league::League;
use crate::workers::{WorkerAction, WorkerOutcome};

#[derive(Debug)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<WorkerOutcome>,
    pub errors: usize,
}

impl TickReport {
    pub fn done_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    services: Arc<Services>,
    health: HealthState,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl Scheduler {
    pub fn new(services: Arc<Services>, health: HealthState, interval: Duration) -> Self {
        Self {
            services,
            health,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Start the loop; returns false if it was already running
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return false;
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.services.clone(),
            self.health.clone(),
            self.interval,
            shutdown_rx,
        ));
        *running = Some(RunningLoop { shutdown, handle });
        true
    }

    /// Stop the loop and wait for an in-flight tick; returns false if not running
    pub async fn stop(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };

        let was_running = !current.handle.is_finished();
        let _ = current.shutdown.send(true);
        if let Err(e) = current.handle.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
        was_running
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn tick_once(&self) -> TickReport {
        tick(&self.services, &self.health, self.services.now()).await
    }
}

/// Run every worker for every league once
pub async fn tick(services: &Services, health: &HealthState, now: DateTime<Utc>) -> TickReport {
    let mut outcomes = Vec::new();
    let mut errors = 0;

    for league in League::ALL {
        for action in WorkerAction::TICK_ORDER {
            match services.run_worker(league, action, now).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    errors += 1;
                    error!("{} {} failed: {:?}", league, action, e);
                }
            }
        }
    }

    let report = TickReport {
        started_at: now,
        outcomes,
        errors,
    };

    if report.errors == 0 {
        health.record_success(now, report.done_count()).await;
    } else {
        health.record_error(now).await;
    }
    report
}

async fn run_loop(
    services: Arc<Services>,
    health: HealthState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting scheduler (tick interval: {}s)", interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let start = std::time::Instant::now();
                let report = tick(&services, &health, services.now()).await;
                if report.done_count() > 0 || report.errors > 0 {
                    info!(
                        "Tick completed: {} actions, {} errors in {:?}",
                        report.done_count(),
                        report.errors,
                        start.elapsed()
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Scheduler stopped");
}
