//! Segment fetch error type for retry classification.

use thiserror::Error;

use crate::http::HttpError;

/// Error returned by one segment fetch attempt (or by the whole fetch once
/// retries are exhausted). Used so we can classify and decide retries before
/// it is reported as a per-segment failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect or TLS handshake failure.
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("timed out: {0}")]
    Timeout(String),
    /// Connection was established but the transfer broke off.
    #[error("transfer failed: {0}")]
    Transfer(String),
    /// Non-2xx status other than 403/404.
    #[error("HTTP {0}")]
    Http(u32),
    #[error("segment not found (HTTP 404)")]
    NotFound,
    #[error("segment forbidden (HTTP 403)")]
    Forbidden,
    /// A transport could not be used at all (e.g. external binary missing).
    #[error("{transport} unavailable: {reason}")]
    Unavailable {
        transport: &'static str,
        reason: String,
    },
    /// Staging write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    #[error("failed after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Map a non-2xx status; 404 and 403 get their own terminal variants.
    pub fn from_status(code: u32) -> Self {
        match code {
            404 => FetchError::NotFound,
            403 => FetchError::Forbidden,
            c => FetchError::Http(c),
        }
    }

    pub fn is_terminal_status(&self) -> bool {
        matches!(self, FetchError::NotFound | FetchError::Forbidden)
    }
}

impl From<HttpError> for FetchError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Connect(m) => FetchError::Connection(m),
            HttpError::Timeout(m) => FetchError::Timeout(m),
            HttpError::Transfer(m) => FetchError::Transfer(m),
            HttpError::Status(code) => FetchError::from_status(code),
        }
    }
}
