use std::env;
use std::time::Duration;

use thiserror::Error;

/// Debounce timing for the commit coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Quiet period after the last edit before a snapshot is taken (default: 30s)
    pub interval: Duration,
    /// Longest a document may go without a snapshot while edits keep arriving (default: 120s)
    pub max_wait: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// What a participant disconnect does to a pending debounce window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// Treat the disconnect like any other edit signal
    #[default]
    Coalesce,
    /// Snapshot right away, bypassing the debounce interval
    FlushImmediately,
}

/// Bounded exponential backoff for failed materializations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 5)
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1s)
    pub base_delay: Duration,
    /// Upper bound on any retry delay (default: 32s)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `failed_attempts` failures:
    /// `base, 2*base, 4*base, ...` capped at `max_delay`.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(2u32.pow(exponent))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Version history configuration, loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// `None` disables debouncing: every signal materializes immediately
    pub debounce: Option<DebounceConfig>,
    pub disconnect_policy: DisconnectPolicy,
    /// How long versions are kept; `None` keeps them forever (default: 30 days)
    pub retention: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            debounce: Some(DebounceConfig::default()),
            disconnect_policy: DisconnectPolicy::default(),
            retention: Some(Duration::from_secs(30 * 24 * 60 * 60)),
            retry: RetryPolicy::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: value.clone(),
        }),
        Err(_) => Ok(default),
    }
}

impl HistoryConfig {
    /// Load configuration from environment variables (and a `.env` file if present)
    ///
    /// - `FOLIO_DEBOUNCE_INTERVAL_MS` (default: 30000)
    /// - `FOLIO_DEBOUNCE_MAX_WAIT_MS` (default: 120000)
    /// - `FOLIO_DEBOUNCE_DISABLED` (default: false)
    /// - `FOLIO_FLUSH_ON_DISCONNECT` (default: false)
    /// - `FOLIO_RETENTION_DAYS` (default: 30, 0 keeps versions forever)
    /// - `FOLIO_RETRY_MAX_ATTEMPTS` (default: 5)
    /// - `FOLIO_RETRY_BASE_MS` (default: 1000)
    /// - `FOLIO_RETRY_MAX_MS` (default: 32000)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let debounce_disabled: bool = parse_var("FOLIO_DEBOUNCE_DISABLED", false)?;
        let debounce = if debounce_disabled {
            None
        } else {
            Some(DebounceConfig {
                interval: Duration::from_millis(parse_var("FOLIO_DEBOUNCE_INTERVAL_MS", 30_000)?),
                max_wait: Duration::from_millis(parse_var("FOLIO_DEBOUNCE_MAX_WAIT_MS", 120_000)?),
            })
        };

        let disconnect_policy = if parse_var("FOLIO_FLUSH_ON_DISCONNECT", false)? {
            DisconnectPolicy::FlushImmediately
        } else {
            DisconnectPolicy::Coalesce
        };

        let retention = match parse_var::<u64>("FOLIO_RETENTION_DAYS", 30)? {
            0 => None,
            days => Some(Duration::from_secs(days * 24 * 60 * 60)),
        };

        let retry = RetryPolicy {
            max_attempts: parse_var("FOLIO_RETRY_MAX_ATTEMPTS", 5)?,
            base_delay: Duration::from_millis(parse_var("FOLIO_RETRY_BASE_MS", 1_000)?),
            max_delay: Duration::from_millis(parse_var("FOLIO_RETRY_MAX_MS", 32_000)?),
        };

        let config = HistoryConfig {
            debounce,
            disconnect_policy,
            retention,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(debounce) = &self.debounce
            && debounce.max_wait < debounce.interval
        {
            return Err(ConfigError::MaxWaitBelowInterval {
                interval: debounce.interval,
                max_wait: debounce.max_wait,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name} environment variable: '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("Debounce max wait ({max_wait:?}) is shorter than the interval ({interval:?})")]
    MaxWaitBelowInterval {
        interval: Duration,
        max_wait: Duration,
    },

    #[error("Retry policy must allow at least one attempt")]
    NoAttempts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HistoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Coalesce);
    }

    #[test]
    fn test_validate_rejects_short_max_wait() {
        let config = HistoryConfig {
            debounce: Some(DebounceConfig {
                interval: Duration::from_secs(10),
                max_wait: Duration::from_secs(5),
            }),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxWaitBelowInterval { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = HistoryConfig {
            retry: RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoAttempts)));
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for(4), Duration::from_secs(8));
        assert_eq!(retry.delay_for(6), Duration::from_secs(32));
        assert_eq!(retry.delay_for(40), Duration::from_secs(32));
    }
}
