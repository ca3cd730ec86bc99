use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Upper bound on concurrent segment fetches; above this LiveATC starts rate-limiting.
pub const MAX_CONCURRENCY: usize = 10;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per segment (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (1.0 gives 1s, 2s, 4s).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 4,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: secs_to_duration("retry.base_delay_secs", self.base_delay_secs)?,
            max_delay: Duration::from_secs(self.max_delay_secs),
        })
    }
}

/// Seconds from config or the command line as a `Duration`. Negative values
/// clamp to zero; NaN, infinite and out-of-range values are rejected.
pub fn secs_to_duration(name: &str, secs: f64) -> Result<Duration> {
    if secs.is_nan() {
        anyhow::bail!("{name}: not a number");
    }
    Duration::try_from_secs_f64(secs.max(0.0))
        .with_context(|| format!("{name}: {secs} seconds is out of range"))
}

/// Transport settings for page and segment fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Try the external `curl` binary before the in-process libcurl stream.
    pub use_external_curl: bool,
    /// Program name or path of the external fetch utility.
    pub curl_program: String,
    /// Hard wall-clock limit for one external fetch; the process is killed after this.
    pub external_timeout_secs: u64,
    /// Whole-transfer timeout for one segment GET.
    pub transfer_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Timeout for discovery page GETs (search and archive pages).
    pub page_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            use_external_curl: true,
            curl_program: "curl".to_string(),
            external_timeout_secs: 35,
            transfer_timeout_secs: 30,
            connect_timeout_secs: 15,
            page_timeout_secs: 10,
        }
    }
}

/// Global configuration loaded from `~/.config/atcarc/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtcarcConfig {
    /// Station search endpoint; queried with `?icao=`.
    pub search_url: String,
    /// Station archive page; queried with `?m=`.
    pub archive_page_url: String,
    /// Host serving the 30-minute MP3 segments.
    pub archive_file_host: String,
    /// Concurrent segment fetches (1 = strictly sequential).
    pub concurrency: usize,
    /// Pacing delay in seconds between dispatches (see scheduler pacing).
    pub delay_secs: f64,
    /// Where segments are staged before being moved to their destination. Defaults to the OS temp dir.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for AtcarcConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.liveatc.net/search/".to_string(),
            archive_page_url: "https://www.liveatc.net/archive.php".to_string(),
            archive_file_host: "https://archive.liveatc.net".to_string(),
            concurrency: 1,
            delay_secs: 10.0,
            staging_dir: None,
            retry: None,
            fetch: FetchConfig::default(),
        }
    }
}

impl AtcarcConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn delay(&self) -> Result<Duration> {
        secs_to_duration("delay_secs", self.delay_secs)
    }

    /// Check the fields that are converted lazily so a bad file fails at load.
    pub fn validate(&self) -> Result<()> {
        self.delay()?;
        self.retry_policy()?;
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("atcarc")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AtcarcConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Same as `load_or_init` but at an explicit path (tests, `--config`).
pub fn load_or_init_at(path: &Path) -> Result<AtcarcConfig> {
    if !path.exists() {
        let default_cfg = AtcarcConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)
            .with_context(|| format!("failed to write default config: {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: AtcarcConfig =
        toml::from_str(&data).with_context(|| format!("invalid config: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}
