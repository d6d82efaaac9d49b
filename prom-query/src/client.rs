use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::PromConfig;
use crate::errors::{PromError, Result};

/// Handle to a Prometheus compatible HTTP API.
///
/// Cloning is cheap: clones share the same connection pool, so one `PromClient` can back
/// any number of query contexts.
#[derive(Debug, Clone)]
pub struct PromClient {
    base_url: Url,
    http: reqwest::Client,
}

impl PromClient {
    /// Initializes a new `PromClientBuilder` instance.
    pub fn builder() -> PromClientBuilder {
        PromClientBuilder::default()
    }

    /// Builds a client from a loaded configuration.
    pub fn from_config(config: &PromConfig) -> Result<Self> {
        Self::builder()
            .address(&config.address)
            .timeout(config.timeout())
            .build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an API endpoint, such as `/api/v1/query`, against the base URL.
    /// Any path prefix on the base URL is preserved.
    pub fn url(&self, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}{}", self.base_url.path().trim_end_matches('/'), endpoint);
        url.set_path(&path);
        url
    }

    /// Sends a POST to the fully resolved `url` and buffers the whole response.
    pub(crate) async fn post(
        &self,
        url: Url,
        headers: HeaderMap,
    ) -> std::result::Result<TransportResponse, TransportFailure> {
        let request = self
            .http
            .request(Method::POST, url)
            .headers(headers)
            .build()
            .map_err(|e| TransportFailure::new(e, None))?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| TransportFailure::new(e, None))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFailure::new(e, Some(status)))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug)]
pub(crate) struct TransportResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

/// A request that failed before a complete response was read.
#[derive(Debug)]
pub(crate) struct TransportFailure {
    pub(crate) error: reqwest::Error,
    pub(crate) status: Option<StatusCode>,
}

impl TransportFailure {
    fn new(error: reqwest::Error, status: Option<StatusCode>) -> Self {
        Self { error, status }
    }
}

/// A builder for configuring and creating a `PromClient` instance.
#[derive(Debug, Clone, Default)]
pub struct PromClientBuilder {
    address: String,
    timeout: Option<Duration>,
    http: Option<reqwest::Client>,
}

impl PromClientBuilder {
    /// Sets the base URL of the backend, e.g. `http://prometheus:9090`.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the per request timeout. Ignored when a custom HTTP client is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses a caller owned `reqwest::Client`, sharing its pool and settings.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<PromClient> {
        let base_url = Url::parse(&self.address)?;
        if base_url.cannot_be_a_base() {
            return Err(PromError::Config(format!(
                "'{}' cannot be used as a base URL",
                self.address
            )));
        }

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder
                    .build()
                    .map_err(|e| PromError::Config(format!("unable to build http client: {}", e)))?
            }
        };

        info!("Prometheus client configured for {}", base_url);

        Ok(PromClient { base_url, http })
    }
}

/// Renders headers as `name: value` pairs for error messages.
pub(crate) fn header_string(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_keeps_path_prefix() {
        let client = PromClient::builder()
            .address("http://cortex:8080/prometheus/")
            .build()
            .expect("client");

        assert_eq!(
            client.url("/api/v1/query").as_str(),
            "http://cortex:8080/prometheus/api/v1/query"
        );

        let client = PromClient::builder()
            .address("http://localhost:9090")
            .build()
            .expect("client");
        assert_eq!(
            client.url("/api/v1/query_range").as_str(),
            "http://localhost:9090/api/v1/query_range"
        );
    }

    #[test]
    fn test_builder_rejects_bad_address() {
        assert!(matches!(
            PromClient::builder().address("not a url").build(),
            Err(PromError::InvalidUrl(_))
        ));
        assert!(PromClient::builder().address("mailto:ops@example.com").build().is_err());
    }
}
