//! Request execution: descriptors, the transport seam, retries and
//! response classification.

mod classify;
mod request;
mod retry;
mod transport;

pub use classify::{Outcome, RATE_LIMITED_STATUS, UNDER_MAINTENANCE_STATUS, classify};
pub use request::{Method, RequestDescriptor};
pub use retry::{
    INITIAL_BACKOFF_MS, MAX_RETRIES, RETRYABLE_STATUSES, RetryPolicy, RetryState, execute,
    is_retryable,
};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};

#[cfg(test)]
pub use transport::MockTransport;
