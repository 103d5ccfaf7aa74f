//! Schedule arithmetic for saved searches.
//!
//! Pure functions over wall-clock time so the scheduler loop, the saved-search
//! store and tests all agree on what "due" and "next" mean.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BugwatchError;

/// How far a search is pushed out when it has no usable interval.
pub const FAR_FUTURE_DAYS: i64 = 999;

/// Longest interval a saved search may be configured with (100 years).
pub const MAX_INTERVAL_HOURS: f64 = 100.0 * 365.0 * 24.0;

/// Whether a saved search runs on the scheduler's cadence or only on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    #[default]
    Manual,
    Automatic,
}

impl ScheduleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleMode::Manual => "manual",
            ScheduleMode::Automatic => "automatic",
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleMode {
    type Err = BugwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(ScheduleMode::Manual),
            "automatic" => Ok(ScheduleMode::Automatic),
            other => Err(BugwatchError::InvalidScheduleMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for ScheduleMode {
    type Error = BugwatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Convert a fractional hour interval into a duration.
///
/// Returns `None` for missing, zero, negative or non-finite intervals.
pub fn interval_duration(interval_hours: Option<f64>) -> Option<Duration> {
    let hours = interval_hours?;
    if !hours.is_finite() || hours <= 0.0 {
        return None;
    }
    let millis = (hours * 3_600_000.0).round() as i64;
    if millis <= 0 {
        return None;
    }
    Duration::try_milliseconds(millis)
}

/// A search is due when it was never scheduled or its time has arrived.
pub fn is_due(next_execution_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match next_execution_at {
        None => true,
        Some(next) => next <= now,
    }
}

/// Compute the next execution time after a run.
///
/// The baseline is the previously scheduled time (or `now` for a first run),
/// so actual wake jitter never accumulates into the schedule. When the
/// baseline lags `now` by more than one interval the schedule advances by
/// whole intervals, keeping its phase instead of replaying every missed slot.
/// Without a usable interval, or when the result would not be representable,
/// the search is pushed [`FAR_FUTURE_DAYS`] out.
pub fn next_execution(
    previous_next: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval_hours: Option<f64>,
) -> DateTime<Utc> {
    interval_duration(interval_hours)
        .and_then(|interval| advance(previous_next.unwrap_or(now), now, interval))
        .unwrap_or_else(|| far_future(now))
}

fn advance(baseline: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    let next = baseline.checked_add_signed(interval)?;
    if next > now {
        return Some(next);
    }
    let behind_ms = (now - next).num_milliseconds();
    let step_ms = interval.num_milliseconds();
    let skipped = behind_ms / step_ms + 1;
    next.checked_add_signed(Duration::try_milliseconds(skipped.checked_mul(step_ms)?)?)
}

fn far_future(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_signed(Duration::days(FAR_FUTURE_DAYS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The `next_execution_at` a search gets when its schedule is configured.
///
/// Automatic searches with an interval start one interval from `now`;
/// automatic searches without one are left unscheduled (immediately due);
/// manual searches are never scheduled.
pub fn initial_next_execution(
    mode: ScheduleMode,
    interval_hours: Option<f64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match mode {
        ScheduleMode::Manual => None,
        ScheduleMode::Automatic => interval_duration(interval_hours)
            .map(|i| now.checked_add_signed(i).unwrap_or_else(|| far_future(now))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_scheduled_is_due() {
        assert!(is_due(None, t0()));
        assert!(is_due(Some(t0()), t0()));
        assert!(!is_due(Some(t0() + Duration::seconds(1)), t0()));
    }

    #[test]
    fn first_run_uses_now_as_baseline() {
        let next = next_execution(None, t0(), Some(24.0));
        assert_eq!(next, t0() + Duration::hours(24));
    }

    #[test]
    fn baseline_is_previous_schedule_not_wake_time() {
        let scheduled = t0();
        // Woke up 40 seconds late.
        let woke = t0() + Duration::seconds(40);
        let next = next_execution(Some(scheduled), woke, Some(1.0));
        assert_eq!(next, t0() + Duration::hours(1));
    }

    #[test]
    fn drift_free_over_many_jittery_wakeups() {
        let initial = t0();
        let h = Duration::minutes(90);
        let mut scheduled = initial;
        for n in 1..=20i32 {
            assert_eq!(scheduled, initial + h * (n - 1));
            let jitter = Duration::seconds(i64::from(n % 7) * 8);
            scheduled = next_execution(Some(scheduled), scheduled + jitter, Some(1.5));
        }
    }

    #[test]
    fn missed_slots_advance_by_whole_intervals() {
        let scheduled = t0();
        let now = t0() + Duration::hours(5) + Duration::minutes(10);
        let next = next_execution(Some(scheduled), now, Some(2.0));
        assert_eq!(next, t0() + Duration::hours(6));
        assert!(next > now);
    }

    #[test]
    fn fractional_interval() {
        let next = next_execution(Some(t0()), t0(), Some(0.25));
        assert_eq!(next, t0() + Duration::minutes(15));
    }

    #[test]
    fn missing_zero_or_negative_interval_is_far_future() {
        for interval in [None, Some(0.0), Some(-3.0), Some(f64::NAN)] {
            let next = next_execution(Some(t0()), t0(), interval);
            assert_eq!(next, t0() + Duration::days(FAR_FUTURE_DAYS));
            assert!(!is_due(Some(next), t0()));
        }
    }

    #[test]
    fn initial_schedule_depends_on_mode() {
        assert_eq!(initial_next_execution(ScheduleMode::Manual, Some(4.0), t0()), None);
        assert_eq!(
            initial_next_execution(ScheduleMode::Automatic, Some(4.0), t0()),
            Some(t0() + Duration::hours(4))
        );
        assert_eq!(initial_next_execution(ScheduleMode::Automatic, None, t0()), None);
    }

    #[test]
    fn huge_interval_pushes_far_out_instead_of_overflowing() {
        let far = t0() + Duration::days(FAR_FUTURE_DAYS);
        assert_eq!(next_execution(Some(t0()), t0(), Some(1e15)), far);
        assert_eq!(next_execution(None, t0(), Some(f64::MAX)), far);
        assert_eq!(
            initial_next_execution(ScheduleMode::Automatic, Some(1e15), t0()),
            Some(far)
        );
    }

    #[test]
    fn longest_allowed_interval_is_representable() {
        let next = next_execution(Some(t0()), t0(), Some(MAX_INTERVAL_HOURS));
        assert_eq!(next, t0() + Duration::hours(MAX_INTERVAL_HOURS as i64));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Automatic".parse::<ScheduleMode>(), Ok(ScheduleMode::Automatic));
        assert_eq!("manual".parse::<ScheduleMode>(), Ok(ScheduleMode::Manual));
        assert!("hourly".parse::<ScheduleMode>().is_err());
    }
}
