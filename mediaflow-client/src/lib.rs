//! Mediaflow Service Client
//!
//! A type-safe HTTP client for the remote-task protocol spoken by every
//! Mediaflow processing service (subtitle removal, speech synthesis,
//! distribution and the rest).
//!
//! The client retries transport-level failures (connection refused, timeout)
//! with exponential backoff. Application-level errors reported by a service
//! are never retried; they surface as [`ClientError::ApiError`].
//!
//! # Example
//!
//! ```no_run
//! use mediaflow_client::ServiceClient;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> mediaflow_client::Result<()> {
//!     let client = ServiceClient::new("http://localhost:9101");
//!
//!     let task_id = client
//!         .submit(Path::new("clip.mp4"), &serde_json::json!({"language": "es"}))
//!         .await?;
//!     let status = client.task_status(&task_id).await?;
//!
//!     println!("remote task {}: {:?}", task_id, status.status);
//!     Ok(())
//! }
//! ```

pub mod error;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use mediaflow_core::dto::remote::{RemoteState, RemoteTaskStatus, SubmitResponse};

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Knobs for request timeouts and transport-level retry
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Transport retries after the first attempt. A request is tried at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    /// Base of the exponential backoff between attempts. The delay after
    /// attempt `n` is `retry_base_delay * 2^(n-1)`.
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// HTTP client for one remote processing service
///
/// Every capability service exposes the same four endpoints: submit an
/// artifact, poll task status, download the result and delete the finished
/// task. One `ServiceClient` instance talks to one service base URL.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    /// Base URL of the service (e.g., "http://localhost:9101")
    base_url: String,
    /// HTTP client instance
    client: Client,
    config: ClientConfig,
}

impl ServiceClient {
    /// Create a new service client with default configuration
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the processing service
    ///
    /// # Example
    /// ```
    /// use mediaflow_client::ServiceClient;
    ///
    /// let client = ServiceClient::new("http://localhost:9101");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Create a new service client with explicit timeout and retry settings
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the processing service
    /// * `config` - Timeout and retry configuration
    pub fn with_config(base_url: impl Into<String>, config: ClientConfig) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            config,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Request Core
    // =============================================================================

    /// Send a request, retrying transport-level failures
    ///
    /// `send` is called once per attempt so non-clonable request bodies
    /// (multipart forms) can be rebuilt. Application errors pass straight
    /// through; only connection and timeout errors are retried.
    async fn send_with_retry<F, Fut>(&self, what: &str, mut send: F) -> Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match send().await {
                Ok(response) => return Ok(response),
                Err(err) if is_transient(&err) => {
                    if attempt > self.config.max_retries {
                        warn!("{} failed after {} attempts: {}", what, attempt, err);
                        return Err(ClientError::RetriesExhausted {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }

                    let delay = self
                        .config
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        "{} transport error (attempt {}): {}; retrying in {:?}",
                        what, attempt, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(ClientError::RequestFailed(err)),
            }
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code, extracting the error body on failure
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle a response and deserialize its JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle a response that carries no body (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.check_status(response).await?;
        Ok(())
    }
}

/// Whether a request error is worth retrying. Only transport-level failures
/// qualify; anything the service actually answered is final.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ServiceClient::new("http://localhost:9101");
        assert_eq!(client.base_url(), "http://localhost:9101");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ServiceClient::new("http://localhost:9101/");
        assert_eq!(client.base_url(), "http://localhost:9101");
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    }
}
