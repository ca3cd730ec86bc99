//! CLI for the atcarc archive downloader.

mod commands;

use anyhow::Result;
use atcarc_core::config;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_completions, run_download, run_download_range, run_stations, RangeArgs};

/// Top-level CLI for atcarc.
#[derive(Debug, Parser)]
#[command(name = "atcarc")]
#[command(about = "atcarc: download LiveATC air-traffic archive recordings", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List the LiveATC stations for an airport.
    Stations {
        /// ICAO airport code (case-insensitive), e.g. KPDX.
        icao: String,
    },

    /// Download one 30-minute archive segment.
    Download {
        /// Station identifier as shown by `stations`, e.g. kpdx_app.
        station: String,
        /// Date as Mon-DD-YYYY (default: today, or the last archived period's date).
        #[arg(short = 'd', long)]
        date: Option<String>,
        /// Start time as HHMMZ on the hour or half hour (default: last archived period).
        #[arg(short = 't', long)]
        time: Option<String>,
        /// Output directory (default: current directory).
        #[arg(short = 'o', long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Download every segment between two times.
    DownloadRange {
        /// Station identifier, e.g. kpdx_app.
        station: String,
        /// First segment as Mon-DD-YYYY-HHMMZ, e.g. Dec-10-2025-0000Z.
        start: String,
        /// Last segment as Mon-DD-YYYY-HHMMZ (default: last archived period).
        #[arg(short = 'e', long)]
        end: Option<String>,
        /// Seconds to pace between downloads (default from config).
        #[arg(long, value_name = "SECS")]
        delay: Option<f64>,
        /// Concurrent downloads, 1 to 10 (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Output directory (default: current directory).
        #[arg(short = 'o', long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell, &mut Cli::command());
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Stations { icao } => run_stations(&cfg, &icao).await?,
            CliCommand::Download {
                station,
                date,
                time,
                output,
            } => {
                let output = output_dir(output)?;
                run_download(&cfg, &station, date.as_deref(), time.as_deref(), &output).await?;
            }
            CliCommand::DownloadRange {
                station,
                start,
                end,
                delay,
                jobs,
                output,
            } => {
                let args = RangeArgs {
                    station,
                    start,
                    end,
                    delay,
                    jobs,
                    output: output_dir(output)?,
                };
                run_download_range(&cfg, args).await?;
            }
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

fn output_dir(arg: Option<PathBuf>) -> Result<PathBuf> {
    match arg {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

#[cfg(test)]
mod tests;
