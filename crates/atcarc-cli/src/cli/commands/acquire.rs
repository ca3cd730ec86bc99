//! Shared driver for `download` and `download-range`: runs the acquisition,
//! prints progress lines, and moves finished segments into the output folder.

use anyhow::{Context, Result};
use atcarc_core::clock::{format_date, format_time_of_day, SegmentRequest};
use atcarc_core::config::AtcarcConfig;
use atcarc_core::discovery::DiscoveryClient;
use atcarc_core::fetcher::SegmentFetcher;
use atcarc_core::scheduler::{
    Acquisition, AcquisitionEvent, RunOptions, RunState, RunSummary, SegmentOutcome,
    SegmentResult,
};
use atcarc_core::storage;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Failures listed individually in the final summary; the rest are counted.
const MAX_LISTED_FAILURES: usize = 10;

/// Exit status after a forced quit (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

pub(super) fn stamp(t: DateTime<Utc>) -> String {
    format!("{}-{}", format_date(t), format_time_of_day(t))
}

pub(super) async fn acquire(
    cfg: &AtcarcConfig,
    station: &str,
    requests: Vec<SegmentRequest>,
    options: RunOptions,
    output: &Path,
) -> Result<RunSummary> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory: {}", output.display()))?;

    let acquisition = Acquisition::new(
        Arc::new(DiscoveryClient::from_config(cfg)),
        Arc::new(SegmentFetcher::from_config(cfg)?),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
                eprintln!("Interrupted again, quitting without waiting.");
                tracing::warn!("second interrupt, exiting before in-flight segments finished");
                std::process::exit(EXIT_INTERRUPTED);
            }
        })
    };

    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<AcquisitionEvent>(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(line) = event_line(&event) {
                println!("{line}");
            }
        }
    });

    let result = acquisition
        .run(station, requests, options, Some(events_tx), cancel)
        .await;
    ctrl_c.abort();
    let _ = printer.await;
    let summary = result?;

    let mut move_failures = 0usize;
    for r in &summary.results {
        if let SegmentOutcome::Success { path, .. } = &r.outcome {
            match storage::move_into(path, output) {
                Ok(dest) => tracing::debug!(dest = %dest.display(), "segment saved"),
                Err(e) => {
                    move_failures += 1;
                    tracing::warn!(path = %path.display(), error = %e, "could not move segment");
                    eprintln!("warning: {:#}", e);
                }
            }
        }
    }

    for line in summary_lines(&summary) {
        println!("{line}");
    }
    if move_failures > 0 {
        println!(
            "{} downloaded segment(s) could not be moved into {}",
            move_failures,
            output.display()
        );
    }
    Ok(summary)
}

/// The first interrupt cancels the run and lets in-flight segments finish.
/// Returns true on a second interrupt, meaning the caller should quit now.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    eprintln!("\nCancelling: letting in-flight segments finish (Ctrl-C again to quit now)...");
    cancel.cancel();
    next_interrupt().await.is_ok()
}

fn event_line(event: &AcquisitionEvent) -> Option<String> {
    match event {
        AcquisitionEvent::Started { archive, total, .. } => Some(format!(
            "Archive {} ({}), {} segment(s)",
            archive.archive_id, archive.airport_prefix, total
        )),
        AcquisitionEvent::SegmentFinished { result, progress } => {
            let counter = format!("[{}/{}]", progress.processed, progress.total);
            Some(match &result.outcome {
                SegmentOutcome::Success { filename, .. } => format!("{counter} [OK] {filename}"),
                SegmentOutcome::Failure { detail, .. } => {
                    format!("{counter} [FAIL] {}: {}", segment_label(result), detail)
                }
                SegmentOutcome::Cancelled => {
                    format!("{counter} [SKIP] {} (cancelled)", segment_label(result))
                }
            })
        }
        AcquisitionEvent::Dispatched { .. } | AcquisitionEvent::Finished { .. } => None,
    }
}

fn segment_label(result: &SegmentResult) -> String {
    format!("{} {}", result.date(), result.time_of_day())
}

fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let verb = match summary.state {
        RunState::Cancelled => "Cancelled",
        _ => "Done",
    };
    let mut lines = vec![format!(
        "{}: {} succeeded, {} failed, {} cancelled of {}",
        verb, summary.succeeded, summary.failed, summary.cancelled, summary.total
    )];
    if summary.failed == 0 {
        return lines;
    }
    lines.push("Failures:".to_string());
    for r in summary.failures().take(MAX_LISTED_FAILURES) {
        if let SegmentOutcome::Failure { detail, .. } = &r.outcome {
            lines.push(format!("  {}: {}", segment_label(r), detail));
        }
    }
    if summary.failed > MAX_LISTED_FAILURES {
        lines.push(format!(
            "  ... and {} more",
            summary.failed - MAX_LISTED_FAILURES
        ));
    }
    lines
}
