//! CLI command handlers, one file per command.

mod acquire;
mod completions;
mod download;
mod range;
mod stations;

pub use completions::run_completions;
pub use download::run_download;
pub use range::{run_download_range, RangeArgs};
pub use stations::run_stations;
