use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::basecamp::BasecampConfig;
use crate::basecamp::rate_limit::RateLimiter;
use crate::error::AppError;

/// Authenticated GET against the Basecamp API with quota enforcement and retries.
pub struct RateLimitedClient {
    http: Client,
    base_url: Url,
    access_token: String,
    limiter: RateLimiter,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RateLimitedClient {
    pub fn new(config: &BasecampConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| AppError::Config(format!("Invalid base url {}: {}", base, e)))?;

        Ok(Self {
            http,
            base_url,
            access_token: config.access_token.clone(),
            limiter: RateLimiter::new(config.calls_per_window, config.window),
            max_retries: config.max_retries.max(1),
            initial_backoff: config.initial_backoff,
        })
    }

    /// Resolve a path relative to the account root; absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::BadRequest(format!("Invalid url {}: {}", path, e)))
    }

    pub async fn fetch(&self, url: &Url) -> Result<Response, AppError> {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            self.limiter.acquire().await;
            debug!("GET {}", url);

            let result = self
                .http
                .get(url.clone())
                .bearer_auth(&self.access_token)
                .send()
                .await;

            match result {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(&response).unwrap_or_else(|| self.limiter.window());
                    warn!("429 from Basecamp for {}, retrying in {:?}", url, wait);
                    sleep(wait).await;
                }
                Ok(response) if response.status().is_client_error()
                    || response.status().is_server_error() =>
                {
                    return Err(AppError::Http {
                        status: response.status(),
                        url: url.to_string(),
                    });
                }
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        warn!("giving up on {} after {} attempts: {}", url, attempt, e);
                        return Err(AppError::Network(e));
                    }
                    warn!(
                        "transient error on {} (attempt {}/{}), retrying in {:?}: {}",
                        url, attempt, self.max_retries, backoff, e
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(AppError::Network(e)),
            }
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Connection resets, TLS handshake failures and timeouts are worth another attempt.
fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
