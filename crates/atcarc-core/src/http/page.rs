//! Whole-page GETs for the discovery endpoints.

use super::{configure_get, HttpError, HttpTimeouts, TlsMode};

/// Fetches a page body as text. Implemented over libcurl in production and
/// over canned markup in tests.
pub trait PageFetcher: Send + Sync {
    fn get(&self, url: &str, tls: TlsMode) -> Result<String, HttpError>;
}

/// Blocking libcurl page fetcher; call from `spawn_blocking` if used from async code.
#[derive(Debug, Clone, Copy)]
pub struct CurlPageFetcher {
    timeouts: HttpTimeouts,
}

impl CurlPageFetcher {
    pub fn new(timeouts: HttpTimeouts) -> Self {
        Self { timeouts }
    }
}

impl PageFetcher for CurlPageFetcher {
    fn get(&self, url: &str, tls: TlsMode) -> Result<String, HttpError> {
        let mut body: Vec<u8> = Vec::new();
        let mut easy = curl::easy::Easy::new();
        configure_get(&mut easy, url, tls, self.timeouts).map_err(|e| HttpError::from_curl(&e))?;
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(|e| HttpError::from_curl(&e))?;
            transfer.perform().map_err(|e| HttpError::from_curl(&e))?;
        }
        let code = easy.response_code().map_err(|e| HttpError::from_curl(&e))?;
        if !(200..300).contains(&code) {
            return Err(HttpError::Status(code));
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// GET with strict certificate checks; if the connection can't be established,
/// retry exactly once with verification disabled.
pub fn get_with_tls_fallback(fetcher: &dyn PageFetcher, url: &str) -> Result<String, HttpError> {
    match fetcher.get(url, TlsMode::Strict) {
        Err(e) if e.is_connect() => {
            tracing::warn!(url, error = %e, "strict TLS request failed, retrying without verification");
            fetcher.get(url, TlsMode::Relaxed)
        }
        other => other,
    }
}
