use crate::db::{SessionStore, VisitorBucket};
use crate::types::Result;
use crate::utils::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 86_400;
const HOURLY_BUCKETS: i64 = 24;
const DAILY_BUCKETS: i64 = 30;

/// Sessions of either kind started within one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisitorCount {
    pub bucket_start: DateTime<Utc>,
    pub sessions: i64,
}

/// Administrative session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionStats {
    /// Distinct users with a live session active within the window
    pub active_users: i64,
    /// Authenticated sessions ever recorded (not yet purged)
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub avg_session_duration_secs: Option<f64>,
    pub anonymous_total: i64,
    pub anonymous_active: i64,
    pub avg_anonymous_duration_secs: Option<f64>,
    pub peak_concurrent_sessions: i64,
    /// Last 24 hours, oldest first, one entry per hour
    pub hourly_visitors: Vec<VisitorCount>,
    /// Last 30 days, oldest first, one entry per day
    pub daily_visitors: Vec<VisitorCount>,
}

/// Builds the session report as of the clock's current time.
pub async fn session_stats(
    store: &dyn SessionStore,
    clock: &dyn Clock,
    window: Duration,
) -> Result<SessionStats> {
    let now = clock.now_secs();
    let since = now - window.as_secs() as i64;

    let totals = store.session_totals().await?;

    let hourly_from = align(now, HOUR_SECS) - (HOURLY_BUCKETS - 1) * HOUR_SECS;
    let daily_from = align(now, DAY_SECS) - (DAILY_BUCKETS - 1) * DAY_SECS;

    let hourly = store.visitor_buckets(hourly_from, HOUR_SECS).await?;
    let daily = store.visitor_buckets(daily_from, DAY_SECS).await?;

    Ok(SessionStats {
        active_users: store.count_active_users(since, now).await?,
        total_sessions: totals.total_sessions,
        active_sessions: store.count_active_authenticated(since, now).await?,
        avg_session_duration_secs: totals.avg_session_duration_secs,
        anonymous_total: totals.anonymous_total,
        anonymous_active: store.count_active_anonymous(since).await?,
        avg_anonymous_duration_secs: totals.avg_anonymous_duration_secs,
        peak_concurrent_sessions: store.peak_concurrent_sessions().await?,
        hourly_visitors: fill_buckets(&hourly, hourly_from, HOUR_SECS, HOURLY_BUCKETS),
        daily_visitors: fill_buckets(&daily, daily_from, DAY_SECS, DAILY_BUCKETS),
    })
}

fn align(ts: i64, bucket: i64) -> i64 {
    ts.div_euclid(bucket) * bucket
}

/// Expands sparse store buckets into a dense series, zero-filling gaps.
fn fill_buckets(
    sparse: &[VisitorBucket],
    from: i64,
    bucket_secs: i64,
    count: i64,
) -> Vec<VisitorCount> {
    (0..count)
        .map(|i| {
            let start = from + i * bucket_secs;
            let sessions = sparse
                .iter()
                .find(|b| b.bucket_start == start)
                .map(|b| b.sessions)
                .unwrap_or(0);
            VisitorCount {
                bucket_start: DateTime::from_timestamp(start, 0).unwrap_or_default(),
                sessions,
            }
        })
        .collect()
}
