use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use notices_core::hierarchy::StaticDirectory;
use notices_core::types::DbId;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Process-level configuration for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL URL. Without one the worker runs on in-memory storage.
    pub database_url: Option<String>,
    pub executive_director_id: Option<DbId>,
    /// Department name to the user heading it.
    pub department_heads: HashMap<String, DbId>,
    pub log_format: LogFormat,
    /// How long each background task gets to finish after shutdown starts.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default  |
    /// |-------------------------|----------|
    /// | `DATABASE_URL`          | (memory) |
    /// | `EXECUTIVE_DIRECTOR_ID` |          |
    /// | `DEPARTMENT_HEADS`      |          |
    /// | `LOG_FORMAT`            | `pretty` |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `10`     |
    ///
    /// `DEPARTMENT_HEADS` is a comma-separated list of `department=user_id`
    /// pairs.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let executive_director_id = get("EXECUTIVE_DIRECTOR_ID")
            .map(|v| v.trim().parse::<DbId>())
            .transpose()
            .context("EXECUTIVE_DIRECTOR_ID must be a user id")?;

        let department_heads = match get("DEPARTMENT_HEADS") {
            Some(list) => StaticDirectory::parse_department_heads(&list)
                .context("DEPARTMENT_HEADS is malformed")?,
            None => HashMap::new(),
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        };

        let shutdown_timeout_secs: u64 = get("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".into())
            .trim()
            .parse()
            .context("SHUTDOWN_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            executive_director_id,
            department_heads,
            log_format,
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        })
    }

    pub fn directory(&self) -> StaticDirectory {
        StaticDirectory::from_parts(self.department_heads.clone(), self.executive_director_id)
    }
}
