use crate::db::SessionStore;
use crate::types::Result;
use crate::utils::clock::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Ratchets the persisted peak-concurrency statistic upward.
///
/// Each tick counts live authenticated plus anonymous sessions seen within the
/// activity window and raises the stored peak if the count exceeds it. The
/// raise is a conditional write in the store, so several instances (or
/// overlapping ticks) can never lower the value.
pub struct PeakTracker {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    interval: Duration,
}

impl PeakTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            interval,
        }
    }

    /// Runs one sample. Returns the new peak when this tick raised it.
    pub async fn tick(&self) -> Result<Option<i64>> {
        let now = self.clock.now_secs();
        let since = now - self.window.as_secs() as i64;

        let current = self.store.count_all_active(since, now).await?;
        let peak = self.store.peak_concurrent_sessions().await?;
        tracing::debug!(current, peak, "Peak tracker sample");

        if current <= peak {
            return Ok(None);
        }

        if self.store.raise_peak_if_higher(current, now).await? {
            tracing::info!(
                previous = peak,
                peak = current,
                "New peak concurrent sessions"
            );
            Ok(Some(current))
        } else {
            // Another writer got there first with an equal or higher value.
            Ok(None)
        }
    }

    /// Ticks on a fixed interval until `shutdown` flips to `true` or its
    /// sender is dropped. A failed tick is logged and the loop carries on.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Peak tracker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Peak tracker tick failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Peak tracker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::traits::MockSessionStore;
    use crate::types::AppError;
    use crate::utils::clock::ManualClock;

    fn tracker(store: MockSessionStore) -> PeakTracker {
        PeakTracker::new(
            Arc::new(store),
            Arc::new(ManualClock::starting_now()),
            Duration::from_secs(300),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_tick_raises_when_current_exceeds_peak() {
        let mut store = MockSessionStore::new();
        store.expect_count_all_active().returning(|_, _| Ok(7));
        store.expect_peak_concurrent_sessions().returning(|| Ok(3));
        store
            .expect_raise_peak_if_higher()
            .withf(|candidate, _| *candidate == 7)
            .times(1)
            .returning(|_, _| Ok(true));

        assert_eq!(tracker(store).tick().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_tick_skips_write_when_not_higher() {
        let mut store = MockSessionStore::new();
        store.expect_count_all_active().returning(|_, _| Ok(3));
        store.expect_peak_concurrent_sessions().returning(|| Ok(3));
        store.expect_raise_peak_if_higher().never();

        assert_eq!(tracker(store).tick().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tick_uses_trailing_window() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now_secs();
        let mut store = MockSessionStore::new();
        store
            .expect_count_all_active()
            .withf(move |since, at| *since == now - 300 && *at == now)
            .times(1)
            .returning(|_, _| Ok(0));
        store.expect_peak_concurrent_sessions().returning(|| Ok(0));

        let tracker = PeakTracker::new(
            Arc::new(store),
            clock,
            Duration::from_secs(300),
            Duration::from_secs(60),
        );
        assert_eq!(tracker.tick().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lost_race_is_not_reported_as_raise() {
        let mut store = MockSessionStore::new();
        store.expect_count_all_active().returning(|_, _| Ok(5));
        store.expect_peak_concurrent_sessions().returning(|| Ok(4));
        store.expect_raise_peak_if_higher().returning(|_, _| Ok(false));

        assert_eq!(tracker(store).tick().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_survives_failing_ticks_and_stops_on_signal() {
        let mut store = MockSessionStore::new();
        store
            .expect_count_all_active()
            .returning(|_, _| Err(AppError::Database("database is locked".to_string())));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(tracker(store).run(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("tracker should stop promptly")
            .expect("tracker task should not panic");
    }
}
