//! Classify fetch errors and HTTP statuses into retry policy error kinds.

use super::error::FetchError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        403 | 404 => ErrorKind::Terminal,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a fetch error into an ErrorKind.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Timeout(_) => ErrorKind::Timeout,
        FetchError::Connection(_) | FetchError::Transfer(_) => ErrorKind::Connection,
        FetchError::Http(code) => classify_http_status(*code),
        FetchError::NotFound | FetchError::Forbidden => ErrorKind::Terminal,
        FetchError::Unavailable { .. }
        | FetchError::Storage(_)
        | FetchError::ExhaustedRetries { .. } => ErrorKind::Other,
    }
}
