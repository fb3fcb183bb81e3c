//! Observability: logging setup and operational counters.
//!
//! Terminal set notifications are the only user-facing signal; everything
//! else lands here.

use std::sync::Once;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// `TALLY_LOG_FORMAT=json` selects JSON; anything else is pretty.
    pub fn from_env() -> Self {
        match std::env::var("TALLY_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initializes the logging subsystem. Subsequent calls are no-ops.
///
/// `RUST_LOG` controls levels (default `info`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Span for one component operation against a set.
#[must_use]
pub fn set_span(operation: &str, set_id: &str) -> Span {
    tracing::info_span!("set", op = operation, set_id = set_id)
}

/// Operational failure counters.
///
/// These are the events that are recovered locally and would otherwise only
/// exist as log lines.
#[derive(Debug, Default)]
pub struct OpsCounters {
    counter_race_exhausted: AtomicU64,
    relocation_failures: AtomicU64,
    dispatch_rejections: AtomicU64,
    duplicate_outcomes: AtomicU64,
}

/// Serializable snapshot of [`OpsCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsCounts {
    pub counter_race_exhausted: u64,
    pub relocation_failures: u64,
    pub dispatch_rejections: u64,
    pub duplicate_outcomes: u64,
}

impl OpsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_counter_race_exhausted(&self) {
        self.counter_race_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relocation_failure(&self) {
        self.relocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_rejection(&self) {
        self.dispatch_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_outcome(&self) {
        self.duplicate_outcomes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OpsCounts {
        OpsCounts {
            counter_race_exhausted: self.counter_race_exhausted.load(Ordering::Relaxed),
            relocation_failures: self.relocation_failures.load(Ordering::Relaxed),
            dispatch_rejections: self.dispatch_rejections.load(Ordering::Relaxed),
            duplicate_outcomes: self.duplicate_outcomes.load(Ordering::Relaxed),
        }
    }
}
