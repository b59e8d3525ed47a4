//! Pipeline tunables.
//!
//! All knobs are optional with safe fallbacks: an unset or unparseable
//! environment variable falls back to the default with a warning rather than
//! failing startup. Per-request overrides from the trigger contract are
//! validated the same way (non-positive values are ignored).

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default events claimed per fanout pass.
pub const DEFAULT_FANOUT_LIMIT: i64 = 50;
/// Default jobs claimed per dispatch pass.
pub const DEFAULT_DISPATCH_LIMIT: i64 = 50;
/// Default delivery attempt budget per job.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
/// Default fanout attempt budget per event.
pub const DEFAULT_EVENT_MAX_ATTEMPTS: i32 = 5;
/// Default fixed retry backoff: one minute.
pub const DEFAULT_RETRY_BACKOFF_MS: i64 = 60_000;
/// Default dead-letter grace period: seven days.
pub const DEFAULT_DEAD_LETTER_GRACE_MS: i64 = 7 * 24 * 60 * 60 * 1000;
/// Default outbound HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;

/// Runtime configuration for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Max pending events claimed per fanout pass.
    pub fanout_limit: i64,
    /// Max pending jobs claimed per dispatch pass.
    pub dispatch_limit: i64,
    /// Delivery attempt budget per job.
    pub max_attempts: i32,
    /// Fanout attempt budget per event before it is skipped terminally.
    pub event_max_attempts: i32,
    /// Fixed delay a failed job waits before becoming requeue-eligible.
    pub retry_backoff_ms: i64,
    /// Age an exhausted job must reach before cleanup deletes it.
    pub dead_letter_grace_ms: i64,
    /// Outbound HTTP timeout; aborts the in-flight call on expiry.
    pub http_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fanout_limit: DEFAULT_FANOUT_LIMIT,
            dispatch_limit: DEFAULT_DISPATCH_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            event_max_attempts: DEFAULT_EVENT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            dead_letter_grace_ms: DEFAULT_DEAD_LETTER_GRACE_MS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `OUTBOX_*` environment variables.
    ///
    /// Never fails: unset variables use defaults, unparseable values warn and
    /// use defaults.
    pub fn from_env() -> Self {
        Self {
            fanout_limit: env_or("OUTBOX_FANOUT_LIMIT", DEFAULT_FANOUT_LIMIT),
            dispatch_limit: env_or("OUTBOX_DISPATCH_LIMIT", DEFAULT_DISPATCH_LIMIT),
            max_attempts: env_or("OUTBOX_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            event_max_attempts: env_or("OUTBOX_EVENT_MAX_ATTEMPTS", DEFAULT_EVENT_MAX_ATTEMPTS),
            retry_backoff_ms: env_or("OUTBOX_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS),
            dead_letter_grace_ms: env_or(
                "OUTBOX_DEAD_LETTER_GRACE_MS",
                DEFAULT_DEAD_LETTER_GRACE_MS,
            ),
            http_timeout_ms: env_or("OUTBOX_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS),
        }
    }

    /// Apply per-request overrides from the trigger contract. Missing or
    /// non-positive values leave the base value in place.
    #[must_use]
    pub fn with_overrides(&self, overrides: &PipelineOverrides) -> Self {
        let mut config = self.clone();
        if let Some(v) = overrides.domain_event_limit.filter(|v| *v > 0) {
            config.fanout_limit = v;
        }
        if let Some(v) = overrides.webhook_limit.filter(|v| *v > 0) {
            config.dispatch_limit = v;
        }
        if let Some(v) = overrides.max_retry_attempts.filter(|v| *v > 0) {
            config.max_attempts = v;
        }
        if let Some(v) = overrides.retry_backoff_ms.filter(|v| *v >= 0) {
            config.retry_backoff_ms = v;
        }
        if let Some(v) = overrides.dead_letter_grace_ms.filter(|v| *v >= 0) {
            config.dead_letter_grace_ms = v;
        }
        config
    }

    /// Outbound HTTP timeout as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Optional overrides accepted by the pipeline trigger contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOverrides {
    /// Overrides the fanout batch limit.
    pub domain_event_limit: Option<i64>,
    /// Overrides the dispatch batch limit.
    pub webhook_limit: Option<i64>,
    /// Overrides the per-job attempt budget.
    pub max_retry_attempts: Option<i32>,
    /// Overrides the fixed retry backoff.
    pub retry_backoff_ms: Option<i64>,
    /// Overrides the dead-letter grace period.
    pub dead_letter_grace_ms: Option<i64>,
}

fn env_or<T: std::str::FromStr + Copy + std::fmt::Display>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var, value = %raw, default = %default, "Unparseable tunable, using default");
                default
            }
        },
        Err(_) => default,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.fanout_limit, 50);
        assert_eq!(config.dispatch_limit, 50);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff_ms, 60_000);
        assert_eq!(config.dead_letter_grace_ms, 604_800_000);
        assert_eq!(config.http_timeout_ms, 15_000);
    }

    #[test]
    fn test_overrides_applied() {
        let base = PipelineConfig::default();
        let overridden = base.with_overrides(&PipelineOverrides {
            domain_event_limit: Some(10),
            webhook_limit: Some(20),
            max_retry_attempts: Some(5),
            retry_backoff_ms: Some(0),
            dead_letter_grace_ms: Some(0),
        });
        assert_eq!(overridden.fanout_limit, 10);
        assert_eq!(overridden.dispatch_limit, 20);
        assert_eq!(overridden.max_attempts, 5);
        assert_eq!(overridden.retry_backoff_ms, 0);
        assert_eq!(overridden.dead_letter_grace_ms, 0);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let base = PipelineConfig::default();
        let overridden = base.with_overrides(&PipelineOverrides {
            domain_event_limit: Some(-5),
            webhook_limit: Some(0),
            max_retry_attempts: Some(-1),
            retry_backoff_ms: Some(-100),
            dead_letter_grace_ms: None,
        });
        assert_eq!(overridden, base);
    }

    #[test]
    fn test_env_fallback_on_garbage() {
        env::set_var("OUTBOX_FANOUT_LIMIT", "not-a-number");
        let config = PipelineConfig::from_env();
        assert_eq!(config.fanout_limit, DEFAULT_FANOUT_LIMIT);
        env::remove_var("OUTBOX_FANOUT_LIMIT");
    }

    #[test]
    fn test_http_timeout_duration() {
        let config = PipelineConfig::default();
        assert_eq!(config.http_timeout(), Duration::from_millis(15_000));
    }
}
