use chrono::Utc;

/// Seconds per day, for retention thresholds expressed in days.
pub const SECS_PER_DAY: i64 = 86_400;

/// Current wall-clock time as unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Timestamp `days` days before `now`. Negative inputs are treated as zero.
#[must_use]
pub fn days_before(now: i64, days: i64) -> i64 {
    now.saturating_sub(days.max(0).saturating_mul(SECS_PER_DAY))
}
