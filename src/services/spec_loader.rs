use crate::constants::{network as network_constants, retry as retry_constants};
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::spec_cache::SpecCache;
use crate::services::spec_document::{parse_for_path, parse_json_or_yaml, SpecDocument};
use crate::utils::paths::expand_home_path;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where a specification comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecSource {
    Path(PathBuf),
    Url(String),
    Document(Value),
}

impl SpecSource {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return SpecSource::Url(trimmed.to_string());
        }
        SpecSource::Path(expand_home_path(trimmed))
    }

    pub fn describe(&self) -> String {
        match self {
            SpecSource::Path(path) => path.display().to_string(),
            SpecSource::Url(url) => url.clone(),
            SpecSource::Document(_) => "<inline document>".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchResponse {
    Modified { body: String, etag: Option<String> },
    NotModified,
}

#[async_trait]
pub trait SpecFetcher: Send + Sync {
    /// Issues one conditional GET. `304` is reported as `NotModified`, never as an error.
    async fn fetch(&self, url: &str, etag: Option<&str>) -> Result<FetchResponse, ToolError>;
}

pub struct HttpSpecFetcher {
    client: Client,
}

impl HttpSpecFetcher {
    pub fn new() -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(network_constants::TIMEOUT_SPEC_FETCH_MS))
            .connect_timeout(Duration::from_millis(
                network_constants::TIMEOUT_CONNECTION_MS,
            ))
            .user_agent(network_constants::USER_AGENT)
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self, url: &str, etag: Option<&str>) -> Result<FetchResponse, ToolError> {
        let mut req = self.client.get(url).header(
            ACCEPT,
            "application/json, application/yaml;q=0.9, */*;q=0.8",
        );
        if let Some(etag) = etag {
            req = req.header(IF_NONE_MATCH, etag);
        }
        let response = req.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResponse::NotModified);
        }
        if !status.is_success() {
            return Err(ToolError::fetch_failure(format!(
                "GET {} returned {}",
                url, status
            ))
            .with_details(serde_json::json!({"status": status.as_u16()})));
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(FetchResponse::Modified { body, etag })
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::MAX_ATTEMPTS,
            base_delay_ms: retry_constants::BASE_DELAY_MS,
            max_delay_ms: retry_constants::MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay after the given 1-based failed attempt: base, 2x base, ... capped at max.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

pub struct SpecLoader {
    logger: Logger,
    cache: SpecCache,
    fetcher: Arc<dyn SpecFetcher>,
    retry: RetryPolicy,
}

impl SpecLoader {
    pub fn new(logger: Logger, cache: SpecCache) -> Result<Self, ToolError> {
        Ok(Self {
            logger: logger.child("loader"),
            cache,
            fetcher: Arc::new(HttpSpecFetcher::new()?),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SpecFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &SpecCache {
        &self.cache
    }

    pub async fn load(&self, source: SpecSource) -> Result<SpecDocument, ToolError> {
        let label = source.describe();
        let document = match source {
            SpecSource::Document(value) => SpecDocument::from_value(value)?,
            SpecSource::Path(path) => SpecDocument::from_value(self.load_path(path)?)?,
            SpecSource::Url(url) => self.load_url(&url).await?,
        };
        self.logger.info(
            "Specification loaded",
            Some(&serde_json::json!({
                "source": label,
                "title": document.title(),
                "paths": document.paths().len(),
            })),
        );
        Ok(document)
    }

    fn load_path(&self, path: PathBuf) -> Result<Value, ToolError> {
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::not_found(format!(
                    "Specification file not found: {}",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        parse_for_path(&path, &text)
    }

    /// Only a document that passed validation is written back to the cache.
    async fn load_url(&self, url: &str) -> Result<SpecDocument, ToolError> {
        let cached = self.cache.get(url).await;
        let etag = cached.as_ref().and_then(|entry| entry.etag.clone());

        let mut attempt = 0;
        let mut last_error: Option<ToolError> = None;
        while attempt < self.retry.max_attempts {
            attempt += 1;
            match self.fetch_once(url, etag.as_deref()).await {
                Ok(None) => {
                    return match cached {
                        Some(entry) => {
                            self.logger.info(
                                "Specification not modified, using cache",
                                Some(&serde_json::json!({"url": url, "etag": etag})),
                            );
                            SpecDocument::from_value(entry.content)
                        }
                        None => Err(ToolError::fetch_failure(format!(
                            "{} answered 304 Not Modified but no cached copy exists",
                            url
                        ))
                        .with_retryable(false)
                        .with_hint("Clear the cache directory and retry.")),
                    };
                }
                Ok(Some((document, new_etag))) => {
                    if let Err(err) = self
                        .cache
                        .put(url, document.as_value(), new_etag.as_deref())
                        .await
                    {
                        self.logger.warn(
                            "Failed to cache specification",
                            Some(&serde_json::json!({"url": url, "error": err.message})),
                        );
                    }
                    return Ok(document);
                }
                Err(err) => {
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        self.logger.warn(
                            "Specification fetch failed, retrying",
                            Some(&serde_json::json!({
                                "url": url,
                                "attempt": attempt,
                                "delay_ms": delay.as_millis() as u64,
                                "error": err.message,
                            })),
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| ToolError::fetch_failure("Specification fetch was never attempted"));
        let mut details = err.details.clone().unwrap_or_else(|| serde_json::json!({}));
        if let Value::Object(map) = &mut details {
            map.insert("url".to_string(), Value::String(url.to_string()));
            map.insert("attempts".to_string(), Value::from(attempt as u64));
        }
        Err(err.with_details(details))
    }

    /// One attempt: `None` means not modified, otherwise the validated
    /// document and its ETag. Parse and validation failures fail the attempt.
    async fn fetch_once(
        &self,
        url: &str,
        etag: Option<&str>,
    ) -> Result<Option<(SpecDocument, Option<String>)>, ToolError> {
        match self.fetcher.fetch(url, etag).await? {
            FetchResponse::NotModified => Ok(None),
            FetchResponse::Modified { body, etag } => {
                let document = SpecDocument::from_value(parse_json_or_yaml(&body)?)?;
                Ok(Some((document, etag)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn classifies_sources() {
        assert_eq!(
            SpecSource::parse("https://api.example.com/openapi.json"),
            SpecSource::Url("https://api.example.com/openapi.json".to_string())
        );
        assert_eq!(
            SpecSource::parse(" specs/petstore.yaml "),
            SpecSource::Path(PathBuf::from("specs/petstore.yaml"))
        );
    }
}
