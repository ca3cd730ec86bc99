//! `atcarc download <station>` – fetch a single segment.

use anyhow::{bail, Result};
use atcarc_core::clock::{format_date, format_time_of_day, single_segment, SegmentClock};
use atcarc_core::config::AtcarcConfig;
use atcarc_core::scheduler::{RunOptions, SegmentOutcome};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

use super::acquire::acquire;

pub async fn run_download(
    cfg: &AtcarcConfig,
    station: &str,
    date: Option<&str>,
    time: Option<&str>,
    output: &Path,
) -> Result<()> {
    let at = single_segment(date, time, Utc::now())?;
    println!(
        "Downloading {} {} {} into {}",
        station,
        format_date(at),
        format_time_of_day(at),
        output.display()
    );

    let requests = SegmentClock::single(at).requests(station);
    let summary = acquire(
        cfg,
        station,
        requests,
        RunOptions::new(1, Duration::ZERO),
        output,
    )
    .await?;

    match summary.results.first().map(|r| &r.outcome) {
        Some(SegmentOutcome::Failure { detail, .. }) => bail!("download failed: {}", detail),
        Some(SegmentOutcome::Cancelled) => bail!("download cancelled"),
        _ => Ok(()),
    }
}
