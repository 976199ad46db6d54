//! Classification of received responses into business outcomes.

use super::transport::RawResponse;
use crate::error::ScanError;

/// Status the service answers with while it is down for planned maintenance.
pub const UNDER_MAINTENANCE_STATUS: u16 = 512;

/// Status the service answers with when it throttles a caller.
///
/// Unrelated to the transport-level 429, which the executor retries.
pub const RATE_LIMITED_STATUS: u16 = 513;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(RawResponse),
    UnderMaintenance,
    RateLimited,
    CommandFailure(RawResponse),
}

pub fn classify(response: RawResponse) -> Outcome {
    if response.is_success() {
        return Outcome::Success(response);
    }
    match response.status {
        UNDER_MAINTENANCE_STATUS => Outcome::UnderMaintenance,
        RATE_LIMITED_STATUS => Outcome::RateLimited,
        _ => Outcome::CommandFailure(response),
    }
}

impl Outcome {
    pub fn into_result(self) -> Result<RawResponse, ScanError> {
        match self {
            Outcome::Success(response) => Ok(response),
            Outcome::UnderMaintenance => Err(ScanError::UnderMaintenance),
            Outcome::RateLimited => Err(ScanError::RateLimited),
            Outcome::CommandFailure(response) => Err(ScanError::CommandFailed(response)),
        }
    }
}
