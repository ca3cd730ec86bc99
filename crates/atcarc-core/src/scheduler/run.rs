//! Dispatch loop for one acquisition run.
//!
//! Keeps up to `concurrency` fetches in flight on blocking workers; requests
//! are dispatched in clock order, paced per `Pacing`, and every completion is
//! folded into the summary here so there is a single writer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::events::{AcquisitionEvent, Progress};
use super::pacing::Pacing;
use super::result::{RunSummary, SegmentResult};
use super::state::RunState;
use crate::clock::SegmentRequest;
use crate::config::MAX_CONCURRENCY;
use crate::discovery::{ArchiveResolver, ArchiveTarget, DiscoveryError};
use crate::fetcher::SegmentSource;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// The station's archive could not be resolved; no segment was attempted.
    #[error("archive resolution failed: {0}")]
    Resolution(#[source] DiscoveryError),
    #[error("worker task failed: {0}")]
    TaskJoin(String),
}

/// Per-run knobs. Concurrency is clamped to `1..=MAX_CONCURRENCY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub concurrency: usize,
    pub delay: Duration,
}

impl RunOptions {
    pub fn new(concurrency: usize, delay: Duration) -> Self {
        let clamped = concurrency.clamp(1, MAX_CONCURRENCY);
        if clamped != concurrency {
            tracing::warn!(
                requested = concurrency,
                using = clamped,
                "concurrency out of range, clamping"
            );
        }
        Self {
            concurrency: clamped,
            delay,
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::new(self.delay, self.concurrency)
    }
}

/// Orchestrates acquisition runs. Archive targets are cached per station so a
/// station is resolved at most once per `Acquisition`.
pub struct Acquisition {
    resolver: Arc<dyn ArchiveResolver>,
    source: Arc<dyn SegmentSource>,
    archives: Mutex<HashMap<String, ArchiveTarget>>,
}

impl Acquisition {
    pub fn new(resolver: Arc<dyn ArchiveResolver>, source: Arc<dyn SegmentSource>) -> Self {
        Self {
            resolver,
            source,
            archives: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `station` (cached), blocking lookup on the blocking pool.
    pub async fn resolve(&self, station: &str) -> Result<ArchiveTarget, AcquireError> {
        if let Some(hit) = self.cached(station) {
            return Ok(hit);
        }
        let resolver = Arc::clone(&self.resolver);
        let key = station.to_string();
        let target = tokio::task::spawn_blocking(move || resolver.resolve_archive(&key))
            .await
            .map_err(|e| AcquireError::TaskJoin(e.to_string()))?
            .map_err(AcquireError::Resolution)?;
        tracing::debug!(station, archive_id = %target.archive_id, "caching archive target");
        if let Ok(mut cache) = self.archives.lock() {
            cache.insert(station.to_string(), target.clone());
        }
        Ok(target)
    }

    fn cached(&self, station: &str) -> Option<ArchiveTarget> {
        self.archives.lock().ok()?.get(station).cloned()
    }

    /// Acquire every request for `station`. Returns one result per request;
    /// per-segment failures never abort the run, only resolution failure does.
    ///
    /// Cancelling `cancel` stops further dispatches. In-flight fetches finish
    /// and report their real outcome; requests that never started are
    /// reported as `Cancelled`.
    pub async fn run(
        &self,
        station: &str,
        requests: Vec<SegmentRequest>,
        options: RunOptions,
        events: Option<mpsc::Sender<AcquisitionEvent>>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, AcquireError> {
        let mut driver = Driver {
            summary: RunSummary::new(requests.len()),
            events,
            cancel,
            cancel_seen: false,
        };

        if driver.cancel.is_cancelled() {
            tracing::info!(station, "cancelled before start");
            driver.cancel_seen = true;
            for request in &requests {
                driver.record(SegmentResult::cancelled(request)).await;
            }
            return Ok(driver.finish().await);
        }

        let target = self.resolve(station).await?;
        driver.summary.state = RunState::Running;
        driver
            .emit(AcquisitionEvent::Started {
                station: station.to_string(),
                archive: target.clone(),
                total: requests.len(),
            })
            .await;

        let pacing = options.pacing();
        let mut pending: VecDeque<SegmentRequest> = requests.into();
        let mut join_set: JoinSet<SegmentResult> = JoinSet::new();
        let mut next_dispatch: Option<Instant> = None;

        while !pending.is_empty() {
            if !driver
                .wait_for_slot(&mut join_set, options.concurrency, &pacing, &mut next_dispatch)
                .await?
            {
                break;
            }
            if let Some(at) = next_dispatch {
                if !driver.wait_until(&mut join_set, at, &pacing, &mut next_dispatch).await? {
                    break;
                }
            }
            if driver.cancel.is_cancelled() {
                driver.cancel_seen = true;
                break;
            }
            let Some(request) = pending.pop_front() else {
                break;
            };

            driver
                .emit(AcquisitionEvent::Dispatched {
                    index: request.index,
                    time: request.time,
                })
                .await;
            tracing::debug!(index = request.index, time = %request.time, "dispatching segment");
            self.spawn_worker(&mut join_set, &target, request, driver.cancel.clone());
            if !pacing.is_sequential() {
                next_dispatch = Some(Instant::now() + pacing.submission_gap());
            }
        }

        if !pending.is_empty() {
            tracing::info!(
                station,
                remaining = pending.len(),
                "cancellation requested, skipping undispatched segments"
            );
        }
        for request in pending.drain(..) {
            driver.record(SegmentResult::cancelled(&request)).await;
        }
        driver.drain(&mut join_set).await?;
        Ok(driver.finish().await)
    }

    fn spawn_worker(
        &self,
        join_set: &mut JoinSet<SegmentResult>,
        target: &ArchiveTarget,
        request: SegmentRequest,
        cancel: CancellationToken,
    ) {
        let source = Arc::clone(&self.source);
        let target = target.clone();
        join_set.spawn(async move {
            let req = request.clone();
            let fetched = tokio::task::spawn_blocking(move || {
                // Blocking threads may start late; re-check before touching the network.
                if cancel.is_cancelled() {
                    return None;
                }
                Some(source.fetch_segment(&target, &req))
            })
            .await;
            match fetched {
                Ok(Some(attempted)) => SegmentResult::from_attempt(&request, attempted),
                Ok(None) => SegmentResult::cancelled(&request),
                Err(e) => SegmentResult::internal_failure(&request, &e.to_string()),
            }
        });
    }
}

/// Mutable state of one run; only the dispatcher touches it.
struct Driver {
    summary: RunSummary,
    events: Option<mpsc::Sender<AcquisitionEvent>>,
    cancel: CancellationToken,
    cancel_seen: bool,
}

impl Driver {
    async fn emit(&self, event: AcquisitionEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event).await;
        }
    }

    async fn record(&mut self, result: SegmentResult) {
        self.summary.record(result.clone());
        let progress = Progress::of(&self.summary);
        self.emit(AcquisitionEvent::SegmentFinished { result, progress })
            .await;
    }

    async fn complete(
        &mut self,
        joined: Result<SegmentResult, tokio::task::JoinError>,
        pacing: &Pacing,
        next_dispatch: &mut Option<Instant>,
    ) -> Result<(), AcquireError> {
        let result = joined.map_err(|e| AcquireError::TaskJoin(e.to_string()))?;
        if pacing.is_sequential() {
            *next_dispatch = Some(Instant::now() + pacing.completion_gap());
        }
        self.record(result).await;
        Ok(())
    }

    /// Block until fewer than `limit` fetches are in flight. Returns false on cancellation.
    async fn wait_for_slot(
        &mut self,
        join_set: &mut JoinSet<SegmentResult>,
        limit: usize,
        pacing: &Pacing,
        next_dispatch: &mut Option<Instant>,
    ) -> Result<bool, AcquireError> {
        while join_set.len() >= limit {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.cancel_seen = true;
                    return Ok(false);
                }
                Some(joined) = join_set.join_next() => {
                    self.complete(joined, pacing, next_dispatch).await?;
                }
            }
        }
        Ok(true)
    }

    /// Sleep until `deadline`, folding in completions as they arrive. A
    /// completion in sequential mode pushes the deadline out. Returns false
    /// on cancellation.
    async fn wait_until(
        &mut self,
        join_set: &mut JoinSet<SegmentResult>,
        deadline: Instant,
        pacing: &Pacing,
        next_dispatch: &mut Option<Instant>,
    ) -> Result<bool, AcquireError> {
        let mut deadline = deadline;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.cancel_seen = true;
                    return Ok(false);
                }
                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    self.complete(joined, pacing, next_dispatch).await?;
                    if let Some(at) = *next_dispatch {
                        deadline = deadline.max(at);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return Ok(true),
            }
        }
    }

    /// Collect every in-flight fetch. Noting a cancellation here still marks
    /// the run cancelled, since those segments were outstanding when it arrived.
    async fn drain(&mut self, join_set: &mut JoinSet<SegmentResult>) -> Result<(), AcquireError> {
        while !join_set.is_empty() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !self.cancel_seen => {
                    self.cancel_seen = true;
                    tracing::info!(in_flight = join_set.len(), "cancellation requested, waiting for in-flight segments");
                }
                Some(joined) = join_set.join_next() => {
                    let result = joined.map_err(|e| AcquireError::TaskJoin(e.to_string()))?;
                    self.record(result).await;
                }
            }
        }
        Ok(())
    }

    async fn finish(mut self) -> RunSummary {
        let state = if self.cancel_seen {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        self.summary.finish(state);
        tracing::info!(
            ?state,
            total = self.summary.total,
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            cancelled = self.summary.cancelled,
            "acquisition finished"
        );
        let progress = Progress::of(&self.summary);
        self.emit(AcquisitionEvent::Finished { state, progress })
            .await;
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SegmentClock;
    use crate::fetcher::FetchedSegment;
    use crate::retry::{Attempted, FetchError};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant as StdInstant;

    struct FakeResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeResolver {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    impl ArchiveResolver for FakeResolver {
        fn resolve_archive(&self, station: &str) -> Result<ArchiveTarget, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DiscoveryError::Resolution {
                    station: station.to_string(),
                });
            }
            Ok(ArchiveTarget {
                archive_id: "KPDX-App-Dep".into(),
                airport_prefix: "kpdx".into(),
            })
        }
    }

    /// Sleeps `work` per fetch, fails the indices in `missing` with 404, and
    /// tracks start times and peak parallelism.
    struct FakeSource {
        work: Duration,
        missing: Vec<usize>,
        starts: Mutex<Vec<StdInstant>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSource {
        fn new(work: Duration) -> Arc<Self> {
            Self::with_missing(work, Vec::new())
        }

        fn with_missing(work: Duration, missing: Vec<usize>) -> Arc<Self> {
            Arc::new(Self {
                work,
                missing,
                starts: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.starts.lock().unwrap().len()
        }
    }

    impl SegmentSource for FakeSource {
        fn fetch_segment(
            &self,
            target: &ArchiveTarget,
            request: &SegmentRequest,
        ) -> Attempted<FetchedSegment> {
            self.starts.lock().unwrap().push(StdInstant::now());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.work);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.missing.contains(&request.index) {
                return Attempted {
                    result: Err(FetchError::NotFound),
                    attempts: 1,
                };
            }
            let filename = format!(
                "{}-{}-{}.mp3",
                target.archive_id,
                request.date(),
                request.time_of_day()
            );
            Attempted {
                result: Ok(FetchedSegment {
                    path: PathBuf::from("/staging").join(&filename),
                    filename,
                }),
                attempts: 1,
            }
        }
    }

    fn requests(n: usize) -> Vec<SegmentRequest> {
        let start = Utc.with_ymd_and_hms(2021, 10, 1, 0, 0, 0).unwrap();
        let end = start + chrono::Duration::minutes(30 * (n as i64 - 1));
        SegmentClock::new(start, end).unwrap().requests("kpdx_app")
    }

    fn options(concurrency: usize, delay_ms: u64) -> RunOptions {
        RunOptions::new(concurrency, Duration::from_millis(delay_ms))
    }

    #[tokio::test]
    async fn one_result_per_request_in_index_order() {
        let source = FakeSource::new(Duration::from_millis(5));
        let acq = Acquisition::new(FakeResolver::ok(), source.clone());
        let summary = acq
            .run("kpdx_app", requests(6), options(3, 10), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.total, 6);
        assert_eq!(summary.succeeded, 6);
        let indices: Vec<_> = summary.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());
        assert_eq!(source.calls(), 6);
    }

    #[tokio::test]
    async fn segment_failures_do_not_abort_the_run() {
        let source = FakeSource::with_missing(Duration::from_millis(1), vec![1, 3]);
        let acq = Acquisition::new(FakeResolver::ok(), source);
        let summary = acq
            .run("kpdx_app", requests(4), options(1, 1), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!((summary.succeeded, summary.failed), (2, 2));
        let failed: Vec<_> = summary.failures().map(|r| r.index).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[tokio::test]
    async fn sequential_mode_waits_delay_after_each_completion() {
        let source = FakeSource::new(Duration::from_millis(5));
        let acq = Acquisition::new(FakeResolver::ok(), source.clone());
        acq.run("kpdx_app", requests(4), options(1, 60), None, CancellationToken::new())
            .await
            .unwrap();
        let starts = source.starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(60),
                "dispatches closer than the pacing delay"
            );
        }
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_mode_staggers_dispatches() {
        let source = FakeSource::new(Duration::from_millis(1));
        let acq = Acquisition::new(FakeResolver::ok(), source);
        let started = StdInstant::now();
        // 4 workers, 200ms delay: 50ms between dispatches, 5 gaps for 6 requests.
        acq.run("kpdx_app", requests(6), options(4, 200), None, CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn in_flight_fetches_never_exceed_concurrency() {
        let source = FakeSource::new(Duration::from_millis(30));
        let acq = Acquisition::new(FakeResolver::ok(), source.clone());
        acq.run("kpdx_app", requests(8), options(2, 0), None, CancellationToken::new())
            .await
            .unwrap();
        assert!(source.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn resolution_failure_aborts_before_any_fetch() {
        let source = FakeSource::new(Duration::ZERO);
        let acq = Acquisition::new(FakeResolver::failing(), source.clone());
        let err = acq
            .run("nope", requests(3), options(1, 0), None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AcquireError::Resolution(DiscoveryError::Resolution { .. })
        ));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn station_is_resolved_once_across_runs() {
        let resolver = FakeResolver::ok();
        let acq = Acquisition::new(resolver.clone(), FakeSource::new(Duration::ZERO));
        for _ in 0..2 {
            acq.run("kpdx_app", requests(2), options(2, 0), None, CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_after_two_segments_reports_rest_cancelled() {
        let source = FakeSource::new(Duration::from_millis(1));
        let acq = Acquisition::new(FakeResolver::ok(), source.clone());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut finished = 0;
                while let Some(ev) = rx.recv().await {
                    if let AcquisitionEvent::SegmentFinished { .. } = ev {
                        finished += 1;
                        if finished == 2 {
                            cancel.cancel();
                        }
                    }
                }
            })
        };

        // Long delay so the dispatcher is parked in pacing when the cancel lands.
        let summary = acq
            .run("kpdx_app", requests(5), options(1, 500), Some(tx), cancel)
            .await
            .unwrap();
        watcher.await.unwrap();

        assert_eq!(summary.state, RunState::Cancelled);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.cancelled, 3);
        assert!(summary.results[..2].iter().all(|r| r.is_success()));
        assert!(summary.results[2..].iter().all(|r| r.is_cancelled()));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_with_parallel_workers_lets_in_flight_segments_finish() {
        let source = FakeSource::new(Duration::from_millis(300));
        let acq = Acquisition::new(FakeResolver::ok(), source.clone());
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            });
        }

        let summary = acq
            .run("kpdx_app", requests(8), options(4, 40), None, cancel)
            .await
            .unwrap();

        assert_eq!(summary.state, RunState::Cancelled);
        assert_eq!(summary.results.len(), 8);
        assert!(summary.succeeded >= 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.succeeded + summary.cancelled, 8);
        // Fetches that started ran to completion; the rest never hit the source.
        assert_eq!(source.calls(), summary.succeeded);
    }

    #[tokio::test]
    async fn worker_cancelled_before_it_starts_skips_the_fetch() {
        let source = FakeSource::new(Duration::ZERO);
        let acq = Acquisition::new(FakeResolver::ok(), source.clone());
        let target = ArchiveTarget {
            archive_id: "KPDX-App-Dep".into(),
            airport_prefix: "kpdx".into(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut join_set = JoinSet::new();
        let request = requests(1).remove(0);
        acq.spawn_worker(&mut join_set, &target, request, cancel);
        let result = join_set.join_next().await.unwrap().unwrap();

        assert!(result.is_cancelled());
        assert_eq!(result.index, 0);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_touches_nothing() {
        let resolver = FakeResolver::ok();
        let source = FakeSource::new(Duration::ZERO);
        let acq = Acquisition::new(resolver.clone(), source.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = acq
            .run("kpdx_app", requests(3), options(1, 0), None, cancel)
            .await
            .unwrap();
        assert_eq!(summary.state, RunState::Cancelled);
        assert_eq!(summary.cancelled, 3);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn events_report_progress_in_completion_order() {
        let acq = Acquisition::new(FakeResolver::ok(), FakeSource::new(Duration::ZERO));
        let (tx, mut rx) = mpsc::channel(64);
        acq.run("kpdx_app", requests(3), options(1, 0), Some(tx), CancellationToken::new())
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(ev);
        }
        assert!(matches!(seen.first(), Some(AcquisitionEvent::Started { total: 3, .. })));
        let processed: Vec<_> = seen
            .iter()
            .filter_map(|ev| match ev {
                AcquisitionEvent::SegmentFinished { progress, .. } => Some(progress.processed),
                _ => None,
            })
            .collect();
        assert_eq!(processed, vec![1, 2, 3]);
        assert!(matches!(
            seen.last(),
            Some(AcquisitionEvent::Finished {
                state: RunState::Completed,
                progress: Progress { succeeded: 3, .. }
            })
        ));
    }

    #[test]
    fn options_clamp_concurrency() {
        assert_eq!(options(0, 0).concurrency, 1);
        assert_eq!(options(50, 0).concurrency, MAX_CONCURRENCY);
        assert_eq!(options(4, 0).concurrency, 4);
    }
}
