//! Consecutive-failure counters for the scheduler, surfaced on `/health`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scheduler health as reported by `/health`
#[derive(Clone)]
pub struct HealthState {
    pub last_tick_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_tick_actions: Arc<RwLock<usize>>,
    pub error_count: Arc<RwLock<usize>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            last_tick_time: Arc::new(RwLock::new(None)),
            last_tick_actions: Arc::new(RwLock::new(0)),
            error_count: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn record_success(&self, at: DateTime<Utc>, actions: usize) {
        *self.last_tick_time.write().await = Some(at);
        *self.last_tick_actions.write().await = actions;
        *self.error_count.write().await = 0;
    }

    pub async fn record_error(&self, at: DateTime<Utc>) {
        *self.last_tick_time.write().await = Some(at);
        *self.error_count.write().await += 1;
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn success_resets_the_error_streak() {
        let health = HealthState::new();
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap();

        health.record_error(at).await;
        health.record_error(at).await;
        assert_eq!(*health.error_count.read().await, 2);

        health.record_success(at, 3).await;
        assert_eq!(*health.error_count.read().await, 0);
        assert_eq!(*health.last_tick_actions.read().await, 3);
        assert_eq!(*health.last_tick_time.read().await, Some(at));
    }
}
