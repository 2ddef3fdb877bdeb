//! Crate-wide error types.
//!
//! Recoverable, classifiable failures go through `ArbError`/`VenueError` so callers can match on
//! variants instead of grepping error strings (see design note 9(b): no more "409" substring
//! checks). Initialization failures that should abort the process stay on `anyhow::Result`.

use thiserror::Error;

/// An error surfaced by a venue adapter (C2) while placing, querying, or cancelling an order, or
/// while fetching a balance/price.
#[derive(Debug, Error)]
pub enum VenueError {
    /// The venue rejected the request because of a position limit, the market no longer being
    /// tradeable, or an explicit conflict response (HTTP 409 on Venue-A). The executor treats
    /// this as a distinct, longer cooldown than a generic failure.
    #[error("venue reported a conflict: {0}")]
    Conflict(String),

    /// Request failed for any other reason (network, malformed response, non-conflict 4xx/5xx).
    #[error("venue request failed: {0}")]
    Request(String),

    /// The response parsed but carried no order id where one was expected.
    #[error("venue response missing order id")]
    MissingOrderId,

    /// The request timed out.
    #[error("venue request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        VenueError::Request(e.to_string())
    }
}

/// Top-level error type for the trading pipeline (C1–C10). Every recoverable failure category in
/// the error-handling table is represented here so match arms at the runner boundary are
/// exhaustive rather than string-based.
#[derive(Debug, Error)]
pub enum ArbError {
    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("catalog refresh failed: {0}")]
    CatalogRefresh(String),

    #[error("schedule oracle error: {0}")]
    ScheduleOracle(String),
}
