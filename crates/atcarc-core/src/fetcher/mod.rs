//! Segment fetcher: one 30-minute MP3 from the archive host to staging.
//!
//! Each attempt walks the transport chain in order (external curl, then
//! in-process libcurl). A 403/404 from any transport ends the fetch at once;
//! other failures fall through to the next transport, and the attempt as a
//! whole is retried with backoff when its error is transient.

mod external;
mod stream;
mod transport;

pub use external::CurlCommand;
pub use stream::CurlStream;
pub use transport::Transport;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::SegmentRequest;
use crate::config::AtcarcConfig;
use crate::discovery::ArchiveTarget;
use crate::http::HttpTimeouts;
use crate::retry::{run_with_retry, Attempted, FetchError, RetryPolicy};
use crate::storage;

/// `{archive_id}-{date}-{time_of_day}.mp3`, e.g. `KPDX-App-Dep-Oct-01-2021-0000Z.mp3`.
pub fn segment_filename(archive_id: &str, date: &str, time_of_day: &str) -> String {
    format!("{}-{}-{}.mp3", archive_id, date, time_of_day)
}

/// `{host}/{airport}/{filename}`.
pub fn segment_url(host: &str, airport_prefix: &str, filename: &str) -> String {
    format!("{}/{}/{}", host.trim_end_matches('/'), airport_prefix, filename)
}

/// A segment that is completely written to staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSegment {
    pub path: PathBuf,
    pub filename: String,
}

/// Fetches one segment for a resolved station. The scheduler depends on this
/// seam rather than on `SegmentFetcher` directly.
pub trait SegmentSource: Send + Sync {
    fn fetch_segment(
        &self,
        target: &ArchiveTarget,
        request: &SegmentRequest,
    ) -> Attempted<FetchedSegment>;
}

/// Blocking fetcher; call from `spawn_blocking` if used from async code.
pub struct SegmentFetcher {
    host: String,
    staging_dir: PathBuf,
    transports: Vec<Box<dyn Transport>>,
    policy: RetryPolicy,
}

impl SegmentFetcher {
    pub fn new(
        host: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
        transports: Vec<Box<dyn Transport>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            host: host.into(),
            staging_dir: staging_dir.into(),
            transports,
            policy,
        }
    }

    /// Transport chain and retry policy from `cfg`: external curl (if enabled), then libcurl.
    pub fn from_config(cfg: &AtcarcConfig) -> anyhow::Result<Self> {
        let f = &cfg.fetch;
        let mut transports: Vec<Box<dyn Transport>> = Vec::with_capacity(2);
        if f.use_external_curl {
            transports.push(Box::new(CurlCommand::new(
                f.curl_program.clone(),
                Duration::from_secs(f.transfer_timeout_secs),
                Duration::from_secs(f.external_timeout_secs),
            )));
        }
        transports.push(Box::new(CurlStream::new(HttpTimeouts::new(
            Duration::from_secs(f.connect_timeout_secs),
            Duration::from_secs(f.transfer_timeout_secs),
        ))));
        Ok(Self::new(
            cfg.archive_file_host.clone(),
            cfg.staging_dir(),
            transports,
            cfg.retry_policy()?,
        ))
    }

    /// Fetch `{archive_id}-{date}-{time_of_day}.mp3` into the staging directory.
    pub fn fetch(
        &self,
        target: &ArchiveTarget,
        date: &str,
        time_of_day: &str,
    ) -> Attempted<FetchedSegment> {
        let filename = segment_filename(&target.archive_id, date, time_of_day);
        let url = segment_url(&self.host, &target.airport_prefix, &filename);
        let final_path = self.staging_dir.join(&filename);
        let temp = storage::temp_path(&final_path);

        if let Err(e) = std::fs::create_dir_all(&self.staging_dir) {
            return Attempted {
                result: Err(FetchError::Storage(e)),
                attempts: 0,
            };
        }

        let out = run_with_retry(&self.policy, |attempt| {
            tracing::debug!(%url, attempt, "fetching segment");
            self.attempt_once(&url, &temp, &final_path)
        });
        match &out.result {
            Ok(_) => tracing::info!(%filename, attempts = out.attempts, "segment staged"),
            Err(e) => tracing::warn!(%filename, attempts = out.attempts, error = %e, "segment failed"),
        }
        Attempted {
            result: out.result.map(|()| FetchedSegment {
                path: final_path,
                filename,
            }),
            attempts: out.attempts,
        }
    }

    /// One pass over the transport chain.
    fn attempt_once(&self, url: &str, temp: &Path, final_path: &Path) -> Result<(), FetchError> {
        let mut last: Option<FetchError> = None;
        for transport in &self.transports {
            storage::discard(temp)?;
            match transport.fetch(url, temp) {
                Ok(0) => {
                    tracing::debug!(transport = transport.name(), "empty body");
                    last = Some(FetchError::Transfer(format!(
                        "{} returned an empty body",
                        transport.name()
                    )));
                }
                Ok(bytes) => {
                    storage::finalize(temp, final_path)?;
                    tracing::debug!(transport = transport.name(), bytes, "transport succeeded");
                    return Ok(());
                }
                Err(e) if e.is_terminal_status() => {
                    storage::discard(temp)?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(transport = transport.name(), error = %e, "transport failed, trying next");
                    last = Some(e);
                }
            }
        }
        storage::discard(temp)?;
        Err(last.unwrap_or(FetchError::Unavailable {
            transport: "transport chain",
            reason: "no transports configured".to_string(),
        }))
    }
}

impl SegmentSource for SegmentFetcher {
    fn fetch_segment(
        &self,
        target: &ArchiveTarget,
        request: &SegmentRequest,
    ) -> Attempted<FetchedSegment> {
        self.fetch(target, &request.date(), &request.time_of_day())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays scripted outcomes; `Ok(body)` writes `body` to the destination.
    struct Scripted {
        name: &'static str,
        script: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        calls: Arc<AtomicU32>,
    }

    impl Scripted {
        fn new(name: &'static str, script: Vec<Result<Vec<u8>, FetchError>>) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    name,
                    script: Mutex::new(script.into()),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl Transport for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Every attempt leaves some bytes behind, like a broken transfer would.
            std::fs::write(dest, b"partial")?;
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Connection("script exhausted".into())));
            let body = next?;
            std::fs::write(dest, &body)?;
            Ok(body.len() as u64)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn target() -> ArchiveTarget {
        ArchiveTarget {
            archive_id: "KPDX-App-Dep".into(),
            airport_prefix: "kpdx".into(),
        }
    }

    #[test]
    fn filename_and_url() {
        let name = segment_filename("KPDX-App-Dep", "Oct-01-2021", "0000Z");
        assert_eq!(name, "KPDX-App-Dep-Oct-01-2021-0000Z.mp3");
        assert_eq!(
            segment_url("https://archive.liveatc.net/", "kpdx", &name),
            "https://archive.liveatc.net/kpdx/KPDX-App-Dep-Oct-01-2021-0000Z.mp3"
        );
    }

    #[test]
    fn two_transient_failures_then_success_takes_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let (t, calls) = Scripted::new(
            "scripted",
            vec![
                Err(FetchError::Timeout("slow".into())),
                Err(FetchError::Connection("reset".into())),
                Ok(b"ID3audio".to_vec()),
            ],
        );
        let f = SegmentFetcher::new("http://h", dir.path(), vec![Box::new(t)], fast_policy());
        let out = f.fetch(&target(), "Oct-01-2021", "0000Z");
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let seg = out.result.unwrap();
        assert_eq!(seg.filename, "KPDX-App-Dep-Oct-01-2021-0000Z.mp3");
        assert_eq!(std::fs::read(&seg.path).unwrap(), b"ID3audio");
        assert!(!storage::temp_path(&seg.path).exists());
    }

    #[test]
    fn not_found_is_one_attempt_and_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let (first, first_calls) = Scripted::new("first", vec![Err(FetchError::NotFound)]);
        let (second, second_calls) = Scripted::new("second", vec![Ok(b"never".to_vec())]);
        let f = SegmentFetcher::new(
            "http://h",
            dir.path(),
            vec![Box::new(first), Box::new(second)],
            fast_policy(),
        );
        let out = f.fetch(&target(), "Oct-01-2021", "0000Z");
        assert!(matches!(out.result, Err(FetchError::NotFound)));
        assert_eq!(out.attempts, 1);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "no partial files left");
    }

    #[test]
    fn falls_back_to_next_transport_within_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = Scripted::new(
            "first",
            vec![Err(FetchError::Unavailable {
                transport: "first",
                reason: "not installed".into(),
            })],
        );
        let (second, _) = Scripted::new("second", vec![Ok(b"ID3".to_vec())]);
        let f = SegmentFetcher::new(
            "http://h",
            dir.path(),
            vec![Box::new(first), Box::new(second)],
            fast_policy(),
        );
        let out = f.fetch(&target(), "Oct-01-2021", "0030Z");
        assert_eq!(out.attempts, 1);
        assert!(out.result.is_ok());
    }

    #[test]
    fn exhausted_retries_leave_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let (t, calls) = Scripted::new("scripted", vec![]);
        let f = SegmentFetcher::new("http://h", dir.path(), vec![Box::new(t)], fast_policy());
        let out = f.fetch(&target(), "Oct-01-2021", "0100Z");
        assert!(matches!(
            out.result,
            Err(FetchError::ExhaustedRetries { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_body_is_treated_as_transient() {
        let dir = tempfile::tempdir().unwrap();
        let (t, _) = Scripted::new("scripted", vec![Ok(Vec::new()), Ok(b"ID3".to_vec())]);
        let f = SegmentFetcher::new("http://h", dir.path(), vec![Box::new(t)], fast_policy());
        let out = f.fetch(&target(), "Oct-01-2021", "0130Z");
        assert_eq!(out.attempts, 2);
        assert!(out.result.is_ok());
    }
}
