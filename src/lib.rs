//! Client for a remote document-comparison service.
//!
//! The interesting part lives in [`http`]: a retrying executor for transient
//! transport failures and a classifier turning responses into typed outcomes.
//! [`auth`] guards every authenticated call against stale tokens, and [`api`]
//! maps the service endpoints onto both.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;

pub use api::ScanClient;
pub use auth::Credential;
pub use config::ClientConfig;
pub use error::ScanError;
