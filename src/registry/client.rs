//! HTTP client shared foundation
//!
//! This module provides a shared HTTP client with:
//! - Caller-supplied timeout and a fixed User-Agent
//! - Exponential backoff retry logic (max 3 retries)
//! - Rate limit error handling

use crate::error::ResolutionError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Default timeout for HTTP requests (60 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default User-Agent header
const DEFAULT_USER_AGENT: &str = concat!("distup/", env!("CARGO_PKG_VERSION"));

/// Maximum number of retry attempts
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BASE_DELAY_MS: u64 = 100;

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, ResolutionError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a new HTTP client with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, ResolutionError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| {
                ResolutionError::network(
                    "",
                    "HTTP client",
                    format!("failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Perform a GET request with retry logic
    ///
    /// Returns `Ok(None)` when the resource does not exist.
    async fn get_optional(
        &self,
        url: &str,
        package: &str,
        source: &str,
    ) -> Result<Option<reqwest::Response>, ResolutionError> {
        let mut last_error = None;
        let mut delay = BASE_DELAY_MS;

        for attempt in 0..=self.max_retries {
            debug!(package, url, attempt, "index request");
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_error = Some(ResolutionError::network(
                            package,
                            source,
                            format!("HTTP {}", status),
                        ));
                    } else if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    } else if !status.is_success() {
                        return Err(ResolutionError::network(
                            package,
                            source,
                            format!("HTTP {}", status),
                        ));
                    } else {
                        return Ok(Some(response));
                    }
                }
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ResolutionError::timeout(package, source)
                    } else {
                        ResolutionError::network(package, source, e.to_string())
                    });
                }
            }

            if attempt < self.max_retries {
                // Wait before retrying with exponential backoff
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay *= 2;
            }
        }

        Err(last_error
            .unwrap_or_else(|| ResolutionError::network(package, source, "unknown error")))
    }

    /// GET and parse a JSON body; `Ok(None)` on 404
    pub async fn get_json_optional<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        package: &str,
        source: &str,
    ) -> Result<Option<T>, ResolutionError> {
        let Some(response) = self.get_optional(url, package, source).await? else {
            return Ok(None);
        };
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ResolutionError::malformed(package, format!("failed to parse JSON: {}", e)))
    }

    /// GET and parse a JSON body; 404 is `NotFound`
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        package: &str,
        source: &str,
    ) -> Result<T, ResolutionError> {
        self.get_json_optional(url, package, source)
            .await?
            .ok_or_else(|| ResolutionError::not_found(package, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_http_client_with_timeout() {
        let client = HttpClient::with_timeout(Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_http_client_default_retries() {
        let client = HttpClient::new().unwrap();
        assert_eq!(client.max_retries, MAX_RETRIES);
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(60));
        assert!(DEFAULT_USER_AGENT.starts_with("distup/"));
        assert_eq!(MAX_RETRIES, 3);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let mut client = HttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        client.max_retries = 0;
        let err = client
            .get_json::<serde_json::Value>("http://127.0.0.1:9/pkg/json", "pkg", "index")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.package(), "pkg");
    }
}
