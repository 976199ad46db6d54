//! Transport seam between the executor and the wire.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::request::{Method, RequestDescriptor};
use super::retry::RETRYABLE_STATUSES;
use crate::error::ScanError;

/// A response as received from the service, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Returns the value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ScanError> {
        serde_json::from_str(&self.body).map_err(|source| ScanError::Decode {
            status: self.status,
            source,
        })
    }
}

/// An error raised by the transport, optionally carrying the response that
/// triggered it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    response: Option<RawResponse>,
    timed_out: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// An error raised because of the status of a received response.
    pub fn status(response: RawResponse) -> Self {
        Self {
            message: format!("server responded with HTTP {}", response.status),
            response: Some(response),
            timed_out: false,
            source: None,
        }
    }

    /// No response arrived before the transport gave up waiting.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
            timed_out: true,
            source: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
            timed_out: false,
            source: None,
        }
    }

    pub fn response(&self) -> Option<&RawResponse> {
        self.response.as_ref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            message: format!("request failed: {}", error),
            response: None,
            timed_out: error.is_timeout(),
            source: Some(Box::new(error)),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` against `base_url` once, without retrying.
    async fn send(
        &self,
        base_url: &str,
        request: &RequestDescriptor,
    ) -> Result<RawResponse, TransportError>;
}

/// Production transport over a shared reqwest client.
///
/// Responses whose status is one of [`RETRYABLE_STATUSES`] are raised as
/// [`TransportError`]s so the executor can back off; every other status is
/// handed back as a [`RawResponse`] for classification.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn to_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), TransportError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::other(format!("invalid header name {:?}: {}", name, e)))?;
    let mut value = HeaderValue::from_str(value)
        .map_err(|e| TransportError::other(format!("invalid value for header {}: {}", name, e)))?;
    if name == AUTHORIZATION {
        value.set_sensitive(true);
    }
    Ok((name, value))
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(
        &self,
        base_url: &str,
        request: &RequestDescriptor,
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), request.path);
        debug!("{} {}...", request.method, url);

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            let (name, value) = to_header(name, value)?;
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await?;
        let raw = RawResponse {
            status,
            headers,
            body,
        };

        debug!("{} {} -> {}", request.method, url, status);

        if RETRYABLE_STATUSES.contains(&status) {
            return Err(TransportError::status(raw));
        }
        Ok(raw)
    }
}
