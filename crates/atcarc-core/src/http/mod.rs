//! libcurl plumbing shared by discovery page GETs and streamed segment GETs.

mod page;

pub use page::{get_with_tls_fallback, CurlPageFetcher, PageFetcher};

use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("atcarc/", env!("CARGO_PKG_VERSION"));

/// Certificate verification mode. LiveATC hosts have inconsistent certificates,
/// so callers fall back to `Relaxed` after a failed `Strict` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub total: Duration,
}

impl HttpTimeouts {
    pub fn new(connect: Duration, total: Duration) -> Self {
        Self { connect, total }
    }
}

/// Failure of one HTTP exchange, independent of libcurl's error codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// DNS, TCP connect, or TLS handshake/verification failed.
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out: {0}")]
    Timeout(String),
    /// Connection was established but the transfer broke (reset, short read).
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("HTTP {0}")]
    Status(u32),
}

impl HttpError {
    /// Map a libcurl error onto our coarse categories.
    pub fn from_curl(e: &curl::Error) -> Self {
        let msg = e.to_string();
        if e.is_operation_timedout() {
            return HttpError::Timeout(msg);
        }
        if e.is_couldnt_connect()
            || e.is_couldnt_resolve_host()
            || e.is_couldnt_resolve_proxy()
            || e.is_ssl_connect_error()
            || e.is_peer_failed_verification()
            || e.is_ssl_certproblem()
            || e.is_ssl_cacert()
            || e.is_ssl_cacert_badfile()
        {
            return HttpError::Connect(msg);
        }
        HttpError::Transfer(msg)
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, HttpError::Connect(_))
    }
}

/// Apply URL, redirects, timeouts and TLS mode to a fresh handle.
pub(crate) fn configure_get(
    easy: &mut curl::easy::Easy,
    url: &str,
    tls: TlsMode,
    timeouts: HttpTimeouts,
) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.useragent(USER_AGENT)?;
    easy.connect_timeout(timeouts.connect)?;
    easy.timeout(timeouts.total)?;
    if tls == TlsMode::Relaxed {
        easy.ssl_verify_peer(false)?;
        easy.ssl_verify_host(false)?;
    }
    Ok(())
}
