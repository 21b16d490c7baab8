//! Environment-driven configuration
//!
//! All settings arrive through environment variables (the services run under
//! cron/systemd where the environment is the configuration surface). Parsing
//! goes through a lookup seam so tests can feed a plain map instead of
//! mutating process-global state.

use crate::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Default worker service URL when `WORKER_BASE_URL` is unset.
pub const DEFAULT_WORKER_BASE_URL: &str = "http://127.0.0.1:8001";

/// Coordinator settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PostgreSQL connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Base URL of the processing worker, e.g. `http://192.168.1.40:8001`.
    pub worker_base_url: String,
    /// MAC address of the worker host, required when wake is enabled.
    pub worker_mac: Option<String>,
    /// IP address of the worker host; magic packets target it when no
    /// broadcast address is configured.
    pub worker_ip: Option<String>,
    /// Directed broadcast address for magic packets. Falls back to
    /// `worker_ip`, then to the limited broadcast address.
    pub worker_broadcast: Option<String>,
    /// Whether the coordinator may send Wake-on-LAN packets.
    pub wake_enabled: bool,
    /// Tips per worker request.
    pub batch_size: usize,
    /// Concurrent in-flight batches.
    pub fanout: usize,
    /// Maximum tips claimed per run.
    pub per_run_limit: i64,
    /// Deadline for each worker HTTP call.
    pub request_timeout: Duration,
    /// Worker attempts per batch before its tips are recorded failed.
    pub max_attempts_per_batch: u32,
    /// Wall-clock budget for the wake poll loop.
    pub wake_timeout: Duration,
    /// Interval between readiness probes during wake.
    pub wake_poll_interval: Duration,
    /// Cosine similarity at or above which two tips share a cluster.
    pub similarity_threshold: f32,
    /// Cluster size required to emit a promotion.
    pub min_mentions: usize,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from a map. Test seam for [`Settings::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;

        let settings = Self {
            database_url,
            worker_base_url: lookup("WORKER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_WORKER_BASE_URL.to_string()),
            worker_mac: lookup("WORKER_MAC"),
            worker_ip: lookup("WORKER_IP"),
            worker_broadcast: lookup("WORKER_BROADCAST"),
            wake_enabled: parse_bool("WAKE_ENABLED", lookup("WAKE_ENABLED"), true)?,
            batch_size: parse_num("BATCH_SIZE", lookup("BATCH_SIZE"), 20)?,
            fanout: parse_num("FANOUT", lookup("FANOUT"), 4)?,
            per_run_limit: parse_num("PER_RUN_LIMIT", lookup("PER_RUN_LIMIT"), 100)?,
            request_timeout: Duration::from_secs(parse_num(
                "REQUEST_TIMEOUT_SEC",
                lookup("REQUEST_TIMEOUT_SEC"),
                120,
            )?),
            max_attempts_per_batch: parse_num(
                "MAX_ATTEMPTS_PER_BATCH",
                lookup("MAX_ATTEMPTS_PER_BATCH"),
                3,
            )?,
            wake_timeout: Duration::from_secs(parse_num(
                "WORKER_WAKE_TIMEOUT_SEC",
                lookup("WORKER_WAKE_TIMEOUT_SEC"),
                120,
            )?),
            wake_poll_interval: Duration::from_secs(parse_num(
                "WORKER_WAKE_POLL_SEC",
                lookup("WORKER_WAKE_POLL_SEC"),
                5,
            )?),
            similarity_threshold: parse_num(
                "SIMILARITY_THRESHOLD",
                lookup("SIMILARITY_THRESHOLD"),
                0.85f32,
            )?,
            min_mentions: parse_num("MIN_MENTIONS", lookup("MIN_MENTIONS"), 3)?,
        };

        if !(0.0..=1.0).contains(&settings.similarity_threshold) {
            return Err(Error::Config(format!(
                "SIMILARITY_THRESHOLD must be within [0, 1], got {}",
                settings.similarity_threshold
            )));
        }
        if settings.batch_size == 0 {
            return Err(Error::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if settings.fanout == 0 {
            return Err(Error::Config("FANOUT must be at least 1".to_string()));
        }
        if settings.per_run_limit < 0 {
            return Err(Error::Config(
                "PER_RUN_LIMIT must not be negative".to_string(),
            ));
        }

        Ok(settings)
    }
}

/// Parse a numeric variable, falling back to `default` when unset.
/// An unparseable value is a configuration error, never a silent default.
fn parse_num<T>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}: invalid value {raw:?}: {e}"))),
    }
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("{name}: invalid boolean {raw:?}"))),
        },
    }
}
