use crate::db::SessionStore;
use crate::types::Result;
use crate::utils::clock::Clock;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

const SECS_PER_DAY: i64 = 86_400;

/// Point-in-time session metrics, refreshed by the [`MetricsSampler`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricsSnapshot {
    /// `None` until the first sample completes
    pub sampled_at: Option<DateTime<Utc>>,
    pub total_users: i64,
    pub active_sessions: i64,
    pub active_users: i64,
    pub anonymous_active: i64,
    pub peak_concurrent_sessions: i64,
    /// Rows removed by the most recent sample
    pub purged_sessions: u64,
    pub purged_anonymous_sessions: u64,
}

/// Shared read side of the latest snapshot.
#[derive(Debug, Clone, Default)]
pub struct MetricsHandle(Arc<ArcSwap<MetricsSnapshot>>);

impl MetricsHandle {
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.0.load_full()
    }

    fn publish(&self, snapshot: MetricsSnapshot) {
        self.0.store(Arc::new(snapshot));
    }
}

/// Periodically samples session counts and performs housekeeping.
pub struct MetricsSampler {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    interval: Duration,
    purge_expired: bool,
    anonymous_retention_days: Option<u32>,
    handle: MetricsHandle,
}

impl MetricsSampler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        interval: Duration,
        handle: MetricsHandle,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            interval,
            purge_expired: false,
            anonymous_retention_days: None,
            handle,
        }
    }

    /// Delete expired and ended authenticated sessions on every sample.
    pub fn with_purge_expired(mut self, enabled: bool) -> Self {
        self.purge_expired = enabled;
        self
    }

    /// Delete anonymous sessions idle for longer than `days`.
    pub fn with_anonymous_retention(mut self, days: Option<u32>) -> Self {
        self.anonymous_retention_days = days;
        self
    }

    pub fn handle(&self) -> MetricsHandle {
        self.handle.clone()
    }

    /// Takes one sample, publishes it and returns it.
    pub async fn tick(&self) -> Result<MetricsSnapshot> {
        let now = self.clock.now_secs();
        let since = now - self.window.as_secs() as i64;

        let purged_sessions = if self.purge_expired {
            self.store.purge_expired_sessions(now).await?
        } else {
            0
        };

        let purged_anonymous_sessions = match self.anonymous_retention_days {
            Some(days) => {
                let before = now - i64::from(days) * SECS_PER_DAY;
                self.store.purge_anonymous_sessions(before).await?
            }
            None => 0,
        };

        if purged_sessions > 0 || purged_anonymous_sessions > 0 {
            tracing::info!(
                purged_sessions,
                purged_anonymous_sessions,
                "Session housekeeping removed rows"
            );
        }

        let snapshot = MetricsSnapshot {
            sampled_at: Some(self.clock.now()),
            total_users: self.store.count_users().await?,
            active_sessions: self.store.count_active_authenticated(since, now).await?,
            active_users: self.store.count_active_users(since, now).await?,
            anonymous_active: self.store.count_active_anonymous(since).await?,
            peak_concurrent_sessions: self.store.peak_concurrent_sessions().await?,
            purged_sessions,
            purged_anonymous_sessions,
        };

        tracing::debug!(
            active_sessions = snapshot.active_sessions,
            anonymous_active = snapshot.anonymous_active,
            "Metrics sampled"
        );

        self.handle.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Samples on a fixed interval until `shutdown` flips to `true` or its
    /// sender is dropped. A failed sample keeps the previous snapshot.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Metrics sampler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Metrics sample failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Metrics sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::traits::MockSessionStore;
    use crate::utils::clock::ManualClock;

    fn counting_store() -> MockSessionStore {
        let mut store = MockSessionStore::new();
        store.expect_count_users().returning(|| Ok(4));
        store
            .expect_count_active_authenticated()
            .returning(|_, _| Ok(3));
        store.expect_count_active_users().returning(|_, _| Ok(2));
        store.expect_count_active_anonymous().returning(|_| Ok(5));
        store.expect_peak_concurrent_sessions().returning(|| Ok(9));
        store
    }

    fn sampler(store: MockSessionStore, clock: Arc<ManualClock>) -> MetricsSampler {
        MetricsSampler::new(
            Arc::new(store),
            clock,
            Duration::from_secs(300),
            Duration::from_secs(30),
            MetricsHandle::default(),
        )
    }

    #[tokio::test]
    async fn test_tick_publishes_snapshot() {
        let clock = Arc::new(ManualClock::starting_now());
        let sampler = sampler(counting_store(), clock.clone());
        let handle = sampler.handle();

        assert!(handle.latest().sampled_at.is_none());

        let snapshot = sampler.tick().await.expect("should sample");

        assert_eq!(snapshot.total_users, 4);
        assert_eq!(snapshot.active_sessions, 3);
        assert_eq!(snapshot.active_users, 2);
        assert_eq!(snapshot.anonymous_active, 5);
        assert_eq!(snapshot.peak_concurrent_sessions, 9);
        assert_eq!(snapshot.sampled_at, Some(clock.now()));
        assert_eq!(*handle.latest(), snapshot);
    }

    #[tokio::test]
    async fn test_housekeeping_is_opt_in() {
        let mut store = counting_store();
        store.expect_purge_expired_sessions().never();
        store.expect_purge_anonymous_sessions().never();

        let snapshot = sampler(store, Arc::new(ManualClock::starting_now()))
            .tick()
            .await
            .expect("should sample");

        assert_eq!(snapshot.purged_sessions, 0);
        assert_eq!(snapshot.purged_anonymous_sessions, 0);
    }

    #[tokio::test]
    async fn test_retention_cutoff() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now_secs();

        let mut store = counting_store();
        store
            .expect_purge_expired_sessions()
            .withf(move |at| *at == now)
            .returning(|_| Ok(2));
        store
            .expect_purge_anonymous_sessions()
            .withf(move |before| *before == now - 7 * SECS_PER_DAY)
            .times(1)
            .returning(|_| Ok(1));

        let snapshot = sampler(store, clock)
            .with_purge_expired(true)
            .with_anonymous_retention(Some(7))
            .tick()
            .await
            .expect("should sample");

        assert_eq!(snapshot.purged_sessions, 2);
        assert_eq!(snapshot.purged_anonymous_sessions, 1);
    }
}
