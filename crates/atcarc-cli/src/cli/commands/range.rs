//! `atcarc download-range <station> <START>` – fetch every segment in a range.

use anyhow::Result;
use atcarc_core::clock::{last_zulu_period, parse_stamp, SegmentClock};
use atcarc_core::config::{secs_to_duration, AtcarcConfig};
use atcarc_core::scheduler::RunOptions;
use chrono::Utc;
use std::path::PathBuf;

use super::acquire::{acquire, stamp};

#[derive(Debug, Clone)]
pub struct RangeArgs {
    pub station: String,
    pub start: String,
    pub end: Option<String>,
    pub delay: Option<f64>,
    pub jobs: Option<usize>,
    pub output: PathBuf,
}

pub async fn run_download_range(cfg: &AtcarcConfig, args: RangeArgs) -> Result<()> {
    let start = parse_stamp(&args.start)?;
    let end = match &args.end {
        Some(e) => parse_stamp(e)?,
        None => last_zulu_period(Utc::now()),
    };
    let clock = SegmentClock::new(start, end)?;

    let options = run_options(cfg, &args)?;

    println!(
        "Downloading {} segment(s) for {} from {} to {} ({} concurrent, {:.1}s delay)",
        clock.len(),
        args.station,
        stamp(clock.start()),
        stamp(clock.end()),
        options.concurrency,
        options.delay.as_secs_f64()
    );
    acquire(
        cfg,
        &args.station,
        clock.requests(&args.station),
        options,
        &args.output,
    )
    .await?;
    Ok(())
}

/// `--jobs` and `--delay` override the config values.
fn run_options(cfg: &AtcarcConfig, args: &RangeArgs) -> Result<RunOptions> {
    let delay = match args.delay {
        Some(secs) => secs_to_duration("--delay", secs)?,
        None => cfg.delay()?,
    };
    Ok(RunOptions::new(args.jobs.unwrap_or(cfg.concurrency), delay))
}
