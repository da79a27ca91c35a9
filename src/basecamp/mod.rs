pub mod client;
pub mod dto;
pub mod paginator;
pub mod rate_limit;

use std::env;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppError;

pub use client::RateLimitedClient;
pub use paginator::Paginator;
pub use rate_limit::RateLimiter;

pub const DEFAULT_CALLS_PER_WINDOW: usize = 45;
pub const DEFAULT_WINDOW_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_USER_AGENT: &str = "basecamp-cache (ops@localhost)";

/// Everything needed to talk to one Basecamp account. Built once at startup and handed
/// to the client explicitly.
#[derive(Clone)]
pub struct BasecampConfig {
    pub access_token: String,
    pub base_url: String,
    pub user_agent: String,
    pub calls_per_window: usize,
    pub window: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub batch_size: usize,
}

impl BasecampConfig {
    pub fn new(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: base_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            calls_per_window: DEFAULT_CALLS_PER_WINDOW,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = lookup("BASECAMP_ACCESS_TOKEN")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config("BASECAMP_ACCESS_TOKEN is not set".to_string()))?;

        let base_url = match lookup("BASECAMP_BASE_URL") {
            Some(url) => url,
            None => {
                let account_id = lookup("BASECAMP_ACCOUNT_ID").ok_or_else(|| {
                    AppError::Config(
                        "BASECAMP_ACCOUNT_ID or BASECAMP_BASE_URL must be set".to_string(),
                    )
                })?;
                format!("https://3.basecampapi.com/{}/", account_id)
            }
        };

        let mut config = Self::new(access_token, base_url);
        if let Some(agent) = lookup("BASECAMP_USER_AGENT") {
            config.user_agent = agent;
        }
        config.calls_per_window =
            parse_var(&lookup, "BASECAMP_CALLS_PER_WINDOW", DEFAULT_CALLS_PER_WINDOW)?;
        config.window = Duration::from_secs(parse_var(
            &lookup,
            "BASECAMP_WINDOW_SECS",
            DEFAULT_WINDOW_SECS,
        )?);
        config.max_retries = parse_var(&lookup, "BASECAMP_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        config.initial_backoff = Duration::from_millis(parse_var(
            &lookup,
            "BASECAMP_INITIAL_BACKOFF_MS",
            DEFAULT_INITIAL_BACKOFF_MS,
        )?);
        config.batch_size = parse_var(&lookup, "SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;

        if config.calls_per_window == 0 || config.max_retries == 0 || config.batch_size == 0 {
            return Err(AppError::Config(
                "quota, retry and batch settings must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

impl fmt::Debug for BasecampConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasecampConfig")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("calls_per_window", &self.calls_per_window)
            .field("window", &self.window)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

/// Read side of the remote API as seen by the sync engine.
#[async_trait]
pub trait BasecampApi: Send + Sync {
    /// Every item reachable from `path` by following `rel="next"` links, optionally
    /// restricted to items updated since `since`.
    async fn fetch_all(
        &self,
        path: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, AppError>;

    /// A single resource; `None` when it no longer exists upstream.
    async fn fetch_one(&self, path: &str) -> Result<Option<Value>, AppError>;
}

pub struct NoopBasecampApi;

#[async_trait]
impl BasecampApi for NoopBasecampApi {
    async fn fetch_all(
        &self,
        _path: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, AppError> {
        Ok(Vec::new())
    }

    async fn fetch_one(&self, _path: &str) -> Result<Option<Value>, AppError> {
        Ok(None)
    }
}
