use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BugwatchError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bugzilla: BugzillaConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BUGWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("BUGWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            database: DatabaseConfig::from_env_profiled(p),
            bugzilla: BugzillaConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values that would make the scheduler or client misbehave.
    pub fn validate(&self) -> Result<(), BugwatchError> {
        if self.scheduler.wake_interval_secs == 0 {
            return Err(BugwatchError::InvalidConfig(
                "SCHEDULER_WAKE_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        if self.bugzilla.timeout_secs == 0 {
            return Err(BugwatchError::InvalidConfig(
                "BUGZILLA_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }
        if self.scheduler.max_manual_runs == 0 {
            return Err(BugwatchError::InvalidConfig(
                "SCHEDULER_MAX_MANUAL_RUNS must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  database:    url={}", self.database.url);
        tracing::info!(
            "  bugzilla:    url={}, api_key={}, timeout={}s",
            self.bugzilla.url,
            if self.bugzilla.api_key.is_some() { "(set)" } else { "(none)" },
            self.bugzilla.timeout_secs
        );
        tracing::info!(
            "  scheduler:   service={}, wake={}s, max_manual_runs={}",
            self.scheduler.service_name,
            self.scheduler.wake_interval_secs,
            self.scheduler.max_manual_runs
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "database": { "url": self.database.url, "max_connections": self.database.max_connections },
            "bugzilla": {
                "url": self.bugzilla.url,
                "timeout_secs": self.bugzilla.timeout_secs,
                "authenticated": self.bugzilla.api_key.is_some(),
            },
            "scheduler": {
                "service_name": self.scheduler.service_name,
                "wake_interval_secs": self.scheduler.wake_interval_secs,
                "max_manual_runs": self.scheduler.max_manual_runs,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Database ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://bugwatch_tracker.db`.
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "DATABASE_URL", "sqlite://bugwatch_tracker.db"),
            max_connections: profiled_env_u32(p, "DB_MAX_CONNECTIONS", 5),
        }
    }
}

// ── Bugzilla ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugzillaConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl BugzillaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "BUGZILLA_URL", "https://bugzilla.mozilla.org"),
            api_key: profiled_env_opt(p, "BUGZILLA_API_KEY"),
            timeout_secs: profiled_env_u64(p, "BUGZILLA_TIMEOUT_SECS", 30),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name under which the loop writes its heartbeat row.
    pub service_name: String,
    pub wake_interval_secs: u64,
    /// Upper bound on concurrently executing "run now" requests.
    pub max_manual_runs: u32,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            service_name: profiled_env_or(p, "SCHEDULER_SERVICE_NAME", "scheduler"),
            wake_interval_secs: profiled_env_u64(p, "SCHEDULER_WAKE_INTERVAL_SECS", 60),
            max_manual_runs: profiled_env_u32(p, "SCHEDULER_MAX_MANUAL_RUNS", 4),
        }
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            service_name: "scheduler".to_string(),
            wake_interval_secs: 60,
            max_manual_runs: 4,
        }
    }
}
