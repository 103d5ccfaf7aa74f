//! Heartbeat liveness rule for background services.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Slack added on top of two missed wake intervals.
pub const STALENESS_MARGIN_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Online,
    Offline,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Online => "online",
            ServiceState::Offline => "offline",
        }
    }
}

/// A heartbeat older than this means the service missed two cycles.
pub fn staleness_threshold(wake_interval: StdDuration) -> Duration {
    let wake = Duration::from_std(wake_interval).unwrap_or_else(|_| Duration::seconds(60));
    wake * 2 + Duration::seconds(STALENESS_MARGIN_SECS)
}

/// Infer liveness from the last heartbeat; no heartbeat at all is offline.
pub fn liveness(
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    wake_interval: StdDuration,
) -> ServiceState {
    match last_heartbeat {
        Some(last) if now - last < staleness_threshold(wake_interval) => ServiceState::Online,
        _ => ServiceState::Offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAKE: StdDuration = StdDuration::from_secs(60);

    #[test]
    fn threshold_for_default_wake_interval() {
        assert_eq!(staleness_threshold(WAKE), Duration::seconds(125));
    }

    #[test]
    fn recent_heartbeat_is_online() {
        let now = Utc::now();
        assert_eq!(liveness(Some(now - Duration::seconds(30)), now, WAKE), ServiceState::Online);
    }

    #[test]
    fn stale_heartbeat_is_offline() {
        let now = Utc::now();
        assert_eq!(liveness(Some(now - Duration::seconds(200)), now, WAKE), ServiceState::Offline);
        assert_eq!(liveness(Some(now - Duration::seconds(125)), now, WAKE), ServiceState::Offline);
    }

    #[test]
    fn missing_heartbeat_is_offline() {
        assert_eq!(liveness(None, Utc::now(), WAKE), ServiceState::Offline);
    }
}
