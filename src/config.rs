use chrono::Duration as ChronoDuration;
use std::time::Duration;

use crate::auth::default_safety_margin;
use crate::http::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = concat!("scanlink/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every call a [`crate::api::ScanClient`] makes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base address of the scanning API.
    pub api_base_url: String,
    /// Base address of the identity server issuing access tokens.
    pub identity_base_url: String,
    pub retry: RetryPolicy,
    pub token_safety_margin: ChronoDuration,
    /// Per-attempt timeout handed to the transport.
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, identity_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            identity_base_url: identity_base_url.into(),
            retry: RetryPolicy::default(),
            token_safety_margin: default_safety_margin(),
            request_timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_token_safety_margin(mut self, margin: ChronoDuration) -> Self {
        self.token_safety_margin = margin;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
