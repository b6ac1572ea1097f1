//! Engine tuning knobs, loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Engine tuning loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an operation waits for the per-note lock before failing
    /// with `Busy`.
    pub lock_timeout: Duration,
    /// Schedule dispatcher tick.
    pub dispatch_interval: Duration,
    /// Maximum due notes handled per sweep.
    pub dispatch_batch_size: i64,
    /// Attempts per recipient when materializing delivery records.
    pub delivery_max_attempts: u32,
    pub delivery_retry_delay: Duration,
    /// Attempts per recipient when creating notifications.
    pub notify_max_attempts: u32,
    pub notify_retry_delay: Duration,
    /// A note pending validation for this long earns its approver a reminder.
    pub reminder_after: chrono::Duration,
    pub reminder_interval: Duration,
    /// Read notifications older than this are deleted.
    pub notification_retention: chrono::Duration,
    pub retention_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5_000),
            dispatch_interval: Duration::from_secs(60),
            dispatch_batch_size: 100,
            delivery_max_attempts: 3,
            delivery_retry_delay: Duration::from_millis(200),
            notify_max_attempts: 3,
            notify_retry_delay: Duration::from_millis(200),
            reminder_after: chrono::Duration::hours(48),
            reminder_interval: Duration::from_secs(3600),
            notification_retention: chrono::Duration::days(90),
            retention_interval: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `LOCK_TIMEOUT_MS`             | `5000`  |
    /// | `DISPATCH_INTERVAL_SECS`      | `60`    |
    /// | `DISPATCH_BATCH_SIZE`         | `100`   |
    /// | `DELIVERY_MAX_ATTEMPTS`       | `3`     |
    /// | `DELIVERY_RETRY_DELAY_MS`     | `200`   |
    /// | `NOTIFY_MAX_ATTEMPTS`         | `3`     |
    /// | `NOTIFY_RETRY_DELAY_MS`       | `200`   |
    /// | `REMINDER_AFTER_HOURS`        | `48`    |
    /// | `REMINDER_INTERVAL_SECS`      | `3600`  |
    /// | `NOTIFICATION_RETENTION_DAYS` | `90`    |
    /// | `RETENTION_INTERVAL_SECS`     | `3600`  |
    ///
    /// Loop intervals must be at least one second.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            lock_timeout: Duration::from_millis(env_or(&lookup, "LOCK_TIMEOUT_MS", 5_000)?),
            dispatch_interval: interval_secs(
                &lookup,
                "DISPATCH_INTERVAL_SECS",
                defaults.dispatch_interval,
            )?,
            dispatch_batch_size: env_or(
                &lookup,
                "DISPATCH_BATCH_SIZE",
                defaults.dispatch_batch_size,
            )?,
            delivery_max_attempts: env_or(
                &lookup,
                "DELIVERY_MAX_ATTEMPTS",
                defaults.delivery_max_attempts,
            )?,
            delivery_retry_delay: Duration::from_millis(env_or(
                &lookup,
                "DELIVERY_RETRY_DELAY_MS",
                200,
            )?),
            notify_max_attempts: env_or(
                &lookup,
                "NOTIFY_MAX_ATTEMPTS",
                defaults.notify_max_attempts,
            )?,
            notify_retry_delay: Duration::from_millis(env_or(
                &lookup,
                "NOTIFY_RETRY_DELAY_MS",
                200,
            )?),
            reminder_after: chrono::Duration::hours(env_or(&lookup, "REMINDER_AFTER_HOURS", 48)?),
            reminder_interval: interval_secs(
                &lookup,
                "REMINDER_INTERVAL_SECS",
                defaults.reminder_interval,
            )?,
            notification_retention: chrono::Duration::days(env_or(
                &lookup,
                "NOTIFICATION_RETENTION_DAYS",
                90,
            )?),
            retention_interval: interval_secs(
                &lookup,
                "RETENTION_INTERVAL_SECS",
                defaults.retention_interval,
            )?,
        })
    }
}

/// Shortest period a background loop ticks at. `tokio::time::interval`
/// panics on a zero period.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

/// Read `var`, falling back to `default` when unset.
fn env_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Read a loop interval in whole seconds. Zero is rejected.
fn interval_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match env_or(lookup, var, default.as_secs())? {
        0 => Err(ConfigError::Invalid {
            var,
            value: lookup(var).unwrap_or_default(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
