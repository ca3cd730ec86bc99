//! External `curl` process transport.
//!
//! The archive host answers the curl CLI more reliably than in-process
//! clients, so this is tried first. The process gets its own `--max-time`
//! and is additionally killed if it outlives a hard wall-clock deadline.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::transport::Transport;
use crate::retry::FetchError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CurlCommand {
    program: String,
    max_time: Duration,
    hard_timeout: Duration,
}

impl CurlCommand {
    pub fn new(program: impl Into<String>, max_time: Duration, hard_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            max_time,
            hard_timeout: hard_timeout.max(max_time),
        }
    }
}

impl Transport for CurlCommand {
    fn name(&self) -> &'static str {
        "curl-command"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut child = Command::new(&self.program)
            .arg("-f")
            .arg("-L")
            .arg("-sS")
            .arg("--max-time")
            .arg(self.max_time.as_secs().max(1).to_string())
            .arg("-o")
            .arg(dest)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FetchError::Unavailable {
                transport: self.name(),
                reason: e.to_string(),
            })?;

        let deadline = Instant::now() + self.hard_timeout;
        let status = loop {
            let polled = child
                .try_wait()
                .map_err(|e| FetchError::Transfer(format!("waiting for {}: {}", self.program, e)))?;
            if let Some(status) = polled {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FetchError::Timeout(format!(
                    "{} killed after {}s",
                    self.program,
                    self.hard_timeout.as_secs()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        map_exit(status.code(), stderr.trim())?;
        // curl does not create the output file for an empty body.
        match std::fs::metadata(dest) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(FetchError::Storage(e)),
        }
    }
}

/// `curl: (22) The requested URL returned error: 404` -> 404.
fn http_status_from_stderr(stderr: &str) -> Option<u32> {
    let (_, rest) = stderr.split_once("returned error: ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Map a curl exit code (see `man curl`, EXIT CODES) onto a fetch error.
fn map_exit(code: Option<i32>, stderr: &str) -> Result<(), FetchError> {
    let detail = || format!("curl exit {}: {}", code.unwrap_or(-1), stderr);
    match code {
        Some(0) => Ok(()),
        Some(22) => Err(http_status_from_stderr(stderr)
            .map(FetchError::from_status)
            .unwrap_or_else(|| FetchError::Transfer(detail()))),
        Some(28) => Err(FetchError::Timeout(detail())),
        Some(5 | 6 | 7 | 35 | 51 | 58 | 60 | 77) => Err(FetchError::Connection(detail())),
        Some(23) => Err(FetchError::Storage(std::io::Error::new(
            std::io::ErrorKind::Other,
            detail(),
        ))),
        Some(_) => Err(FetchError::Transfer(detail())),
        None => Err(FetchError::Transfer(format!("curl terminated by signal: {}", stderr))),
    }
}
