use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::{RawResponse, TransportError};

#[derive(Debug, Error)]
pub enum ScanError {
    /// The credential expires within the safety margin; log in again.
    #[error("access token expired at {expires}, log in again")]
    AuthExpired { expires: DateTime<Utc> },

    #[error("service is under maintenance, try again later")]
    UnderMaintenance,

    #[error("too many requests, slow down and try again later")]
    RateLimited,

    /// Any other non-success response, kept whole for inspection.
    #[error("command failed with HTTP {}: {}", .0.status, .0.body)]
    CommandFailed(RawResponse),

    /// Transport failure, either not retryable or still failing after the
    /// retry budget was spent.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unexpected response body (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}
