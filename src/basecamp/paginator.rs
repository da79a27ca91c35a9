use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::LINK;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::basecamp::{BasecampApi, BasecampConfig, RateLimitedClient};
use crate::error::AppError;
use crate::sync::staleness::to_iso;

/// Walks `Link: <...>; rel="next"` chains on top of [`RateLimitedClient`].
pub struct Paginator {
    client: RateLimitedClient,
}

impl Paginator {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &BasecampConfig) -> Result<Self, AppError> {
        Ok(Self::new(RateLimitedClient::new(config)?))
    }

    fn first_url(&self, path: &str, since: Option<DateTime<Utc>>) -> Result<Url, AppError> {
        let mut url = self.client.resolve(path)?;
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("updated_since", &to_iso(since));
        }
        Ok(url)
    }
}

#[async_trait]
impl BasecampApi for Paginator {
    async fn fetch_all(
        &self,
        path: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, AppError> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(self.first_url(path, since)?);

        while let Some(url) = next.take() {
            if !seen.insert(url.to_string()) {
                debug!("pagination cycle detected at {}", url);
                break;
            }

            let response = match self.client.fetch(&url).await {
                Ok(response) => response,
                Err(AppError::Http { status, .. }) if status == StatusCode::NOT_FOUND => break,
                Err(e) => return Err(e),
            };
            if response.status() == StatusCode::NOT_MODIFIED {
                break;
            }

            let link = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_next_link);

            match response.json::<Value>().await? {
                Value::Array(page) if page.is_empty() => break,
                Value::Array(page) => items.extend(page),
                single => items.push(single),
            }

            next = match link {
                Some(href) => Some(self.client.resolve(&href)?),
                None => None,
            };
        }

        Ok(items)
    }

    async fn fetch_one(&self, path: &str) -> Result<Option<Value>, AppError> {
        let url = self.client.resolve(path)?;
        match self.client.fetch(&url).await {
            Ok(response) if response.status() == StatusCode::NOT_MODIFIED => Ok(None),
            Ok(response) => Ok(Some(response.json::<Value>().await?)),
            Err(AppError::Http { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
