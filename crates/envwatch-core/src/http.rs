//! HTTP transport used by provider adapters.
//!
//! Adapters build [`HttpRequest`]s and hand them to an [`HttpTransport`].
//! Production code uses [`ReqwestTransport`]; tests substitute
//! [`MockTransport`](crate::mock::MockTransport) so no network is touched.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Outgoing request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub json: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Create a request with a 10 second timeout.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            json: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Look up a query parameter.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header, when the provider sent one in seconds.
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Fail unless the status is 2xx. A 429 becomes [`Error::RateLimited`]
    /// carrying the provider's requested delay; anything else is
    /// [`Error::Status`].
    pub fn error_for_status(self, provider: &str) -> Result<Self> {
        match self.status {
            200..=299 => Ok(self),
            429 => Err(Error::RateLimited {
                provider: provider.to_string(),
                retry_after: self.retry_after,
            }),
            status => Err(Error::Status {
                provider: provider.to_string(),
                status,
            }),
        }
    }

    /// Decode a JSON body, mapping failures to [`Error::MalformedResponse`].
    pub fn json<T: DeserializeOwned>(&self, provider: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::malformed(provider, e.to_string()))
    }
}

/// Transport contract for provider adapters.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Send a request and decode a successful JSON response.
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    provider: &str,
    request: HttpRequest,
) -> Result<T> {
    transport
        .send(request)
        .await?
        .error_for_status(provider)?
        .json(provider)
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("envwatch/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let host = host_of(&request.url);
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        builder = builder.query(&request.query).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("request to {}", host), request.timeout)
            } else if e.is_connect() {
                Error::network(host.clone(), format!("connection failed: {}", e))
            } else {
                Error::network(host.clone(), format!("request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(host, format!("failed to read body: {}", e)))?;

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored and
/// the caller falls back to its own backoff.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Host part of a URL for log and error context; never includes the query.
fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://api.example.test/v1/data")
            .query("lat", 47.5)
            .query("units", "metric")
            .header("X-Goog-Api-Key", "secret")
            .timeout(Duration::from_secs(3));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.query_value("lat"), Some("47.5"));
        assert_eq!(request.query_value("units"), Some("metric"));
        assert_eq!(request.query_value("missing"), None);
        assert_eq!(
            request.headers.get("x-goog-api-key").map(String::as_str),
            Some("secret")
        );
        assert_eq!(request.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_error_for_status() {
        assert!(HttpResponse::ok("{}").error_for_status("p").is_ok());

        let err = HttpResponse::new(500, "").error_for_status("p").unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
    }

    #[test]
    fn test_too_many_requests_is_rate_limited() {
        let err = HttpResponse::new(429, "slow down")
            .with_retry_after(Duration::from_secs(7))
            .error_for_status("pollen")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RateLimited { ref provider, retry_after: Some(d) }
                if provider == "pollen" && d == Duration::from_secs(7)
        ));

        let err = HttpResponse::new(429, "").error_for_status("p").unwrap_err();
        assert!(matches!(err, Error::RateLimited { retry_after: None, .. }));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2026 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_json_decode_failure_is_malformed() {
        let err = HttpResponse::ok("<html>")
            .json::<serde_json::Value>("p")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn test_host_of_strips_path_and_query() {
        assert_eq!(
            host_of("https://firms.modaps.eosdis.nasa.gov/api/area/csv/KEY/x"),
            "firms.modaps.eosdis.nasa.gov"
        );
        assert_eq!(host_of("http://localhost:8080?key=1"), "localhost:8080");
        assert_eq!(host_of("no-scheme/path"), "no-scheme");
    }
}
