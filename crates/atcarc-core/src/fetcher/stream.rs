//! In-process libcurl transport: streamed GET with relaxed certificate checks.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::transport::Transport;
use crate::http::{configure_get, HttpError, HttpTimeouts, TlsMode};
use crate::retry::FetchError;

/// Streams the response body to disk chunk by chunk. Certificate
/// verification is off: the archive host's certificates are unreliable.
#[derive(Debug, Clone, Copy)]
pub struct CurlStream {
    timeouts: HttpTimeouts,
}

impl CurlStream {
    pub fn new(timeouts: HttpTimeouts) -> Self {
        Self { timeouts }
    }
}

fn curl_err(e: curl::Error) -> FetchError {
    HttpError::from_curl(&e).into()
}

impl Transport for CurlStream {
    fn name(&self) -> &'static str {
        "curl-stream"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut file = File::create(dest)?;
        let mut written: u64 = 0;
        let mut write_error: Option<std::io::Error> = None;

        let mut easy = curl::easy::Easy::new();
        configure_get(&mut easy, url, TlsMode::Relaxed, self.timeouts).map_err(curl_err)?;
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match file.write_all(data) {
                    Ok(()) => {
                        written += data.len() as u64;
                        Ok(data.len())
                    }
                    Err(e) => {
                        write_error = Some(e);
                        Ok(0) // abort transfer
                    }
                })
                .map_err(curl_err)?;
            if let Err(e) = transfer.perform() {
                drop(transfer);
                if e.is_write_error() {
                    if let Some(io_err) = write_error.take() {
                        return Err(FetchError::Storage(io_err));
                    }
                }
                return Err(curl_err(e));
            }
        }

        let code = easy.response_code().map_err(curl_err)?;
        if !(200..300).contains(&code) {
            return Err(FetchError::from_status(code));
        }
        file.flush()?;
        Ok(written)
    }
}
