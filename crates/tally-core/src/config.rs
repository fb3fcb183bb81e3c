//! Runtime configuration loaded from the environment.
//!
//! Table, queue and topic identifiers of real deployments are injected by the
//! hosting environment; this covers the knobs the core itself reads.

use chrono::Duration;

use crate::domain::{RetryPolicy, TallyError};

const ENV_WORK_BUCKET: &str = "TALLY_WORK_BUCKET";
const ENV_SET_TOPIC: &str = "TALLY_SET_TOPIC";
const ENV_STALL_THRESHOLD_SECS: &str = "TALLY_STALL_THRESHOLD_SECS";
const ENV_POLL_INTERVAL_SECS: &str = "TALLY_POLL_INTERVAL_SECS";
const ENV_COUNTER_MAX_ATTEMPTS: &str = "TALLY_COUNTER_MAX_ATTEMPTS";
const ENV_COUNTER_BACKOFF_MS: &str = "TALLY_COUNTER_BACKOFF_MS";
const ENV_RECORD_TTL_DAYS: &str = "TALLY_RECORD_TTL_DAYS";

const DEFAULT_WORK_BUCKET: &str = "tally-work";
const DEFAULT_SET_TOPIC: &str = "tally-set-events";
const DEFAULT_STALL_THRESHOLD_SECS: u64 = 30 * 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_COUNTER_MAX_ATTEMPTS: u64 = 10;
const DEFAULT_COUNTER_BACKOFF_MS: u64 = 100;
const DEFAULT_RECORD_TTL_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct TallyConfig {
    /// Bucket holding provisional and final artifacts.
    pub work_bucket: String,
    /// Topic terminal set notifications are published to.
    pub set_topic: String,
    /// Idle time after which an incomplete set counts as stalled.
    pub stall_threshold: Duration,
    /// Next-poll hint returned while a set is in progress.
    pub poll_interval: std::time::Duration,
    /// Retry budget for the aggregate counter's conditional writes.
    pub counter_retry: RetryPolicy,
    /// Lifetime of set and task records (`expiresAt`).
    pub record_ttl: Duration,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            work_bucket: DEFAULT_WORK_BUCKET.to_string(),
            set_topic: DEFAULT_SET_TOPIC.to_string(),
            stall_threshold: Duration::seconds(DEFAULT_STALL_THRESHOLD_SECS as i64),
            poll_interval: std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            counter_retry: RetryPolicy::counter_default(),
            record_ttl: Duration::days(DEFAULT_RECORD_TTL_DAYS as i64),
        }
    }
}

impl TallyConfig {
    pub fn from_env() -> Result<Self, TallyError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads config with a custom key lookup (test-friendly).
    pub fn from_env_with<F>(get_env: F) -> Result<Self, TallyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let work_bucket = non_empty(&get_env, ENV_WORK_BUCKET, DEFAULT_WORK_BUCKET)?;
        let set_topic = non_empty(&get_env, ENV_SET_TOPIC, DEFAULT_SET_TOPIC)?;
        let stall_secs =
            parse_positive(&get_env, ENV_STALL_THRESHOLD_SECS, DEFAULT_STALL_THRESHOLD_SECS)?;
        let poll_secs = parse_positive(&get_env, ENV_POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS)?;
        let max_attempts =
            parse_positive(&get_env, ENV_COUNTER_MAX_ATTEMPTS, DEFAULT_COUNTER_MAX_ATTEMPTS)?;
        let backoff_ms = parse_positive(&get_env, ENV_COUNTER_BACKOFF_MS, DEFAULT_COUNTER_BACKOFF_MS)?;
        let ttl_days = parse_positive(&get_env, ENV_RECORD_TTL_DAYS, DEFAULT_RECORD_TTL_DAYS)?;

        let max_attempts = u32::try_from(max_attempts).map_err(|_| {
            TallyError::Config(format!(
                "{ENV_COUNTER_MAX_ATTEMPTS} value {max_attempts} exceeds supported range"
            ))
        })?;

        Ok(Self {
            work_bucket,
            set_topic,
            stall_threshold: seconds(ENV_STALL_THRESHOLD_SECS, stall_secs)?,
            poll_interval: std::time::Duration::from_secs(poll_secs),
            counter_retry: RetryPolicy::fixed(
                max_attempts,
                std::time::Duration::from_millis(backoff_ms),
            ),
            record_ttl: days(ENV_RECORD_TTL_DAYS, ttl_days)?,
        })
    }
}

fn non_empty<F>(get_env: &F, key: &str, default: &str) -> Result<String, TallyError>
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(key) {
        None => Ok(default.to_string()),
        Some(raw) if raw.trim().is_empty() => {
            Err(TallyError::Config(format!("{key} must not be empty")))
        }
        Some(raw) => Ok(raw.trim().to_string()),
    }
}

fn parse_positive<F>(get_env: &F, key: &str, default: u64) -> Result<u64, TallyError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| TallyError::Config(format!("{key} must be a positive integer, got '{raw}'")))?;
    if parsed == 0 {
        return Err(TallyError::Config(format!("{key} must be greater than zero")));
    }
    Ok(parsed)
}

fn seconds(key: &str, secs: u64) -> Result<Duration, TallyError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| TallyError::Config(format!("{key} value {secs} exceeds supported range")))
}

fn days(key: &str, days: u64) -> Result<Duration, TallyError> {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .ok_or_else(|| TallyError::Config(format!("{key} value {days} exceeds supported range")))
}
