//! Station discovery and archive resolution against LiveATC.
//!
//! Two dependent lookups: the ICAO search page lists stations (with their
//! frequencies), and a station's archive page names the current archive file
//! prefix. Both are plain GETs with a one-shot strict→relaxed TLS fallback.

mod airport;
mod parse;

pub use airport::airport_prefix;
pub use parse::{
    parse_liveness, parse_selected_option, parse_stations, station_id_from_href, ParseError,
};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AtcarcConfig;
use crate::http::{get_with_tls_fallback, CurlPageFetcher, HttpError, HttpTimeouts, PageFetcher};

/// One row of a station's frequency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frequency {
    pub label: String,
    pub frequency: String,
}

/// A LiveATC feed as listed on the search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    /// Stable key used in archive URLs (e.g. `kpdx_app`).
    pub identifier: String,
    pub title: String,
    /// Feed status scraped from the page at search time.
    pub is_up: bool,
    pub frequencies: Vec<Frequency>,
}

/// Everything needed to build segment URLs for one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    /// Upstream-assigned filename prefix (e.g. `KPDX-App-Dep`).
    pub archive_id: String,
    /// Directory on the archive host (e.g. `kpdx`).
    pub airport_prefix: String,
}

#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("station search for {icao} failed: {source}")]
    Network {
        icao: String,
        #[source]
        source: HttpError,
    },
    #[error("station search for {icao} returned an unexpected page: {source}")]
    Parse {
        icao: String,
        #[source]
        source: ParseError,
    },
    #[error("archive page for {station} failed: {source}")]
    ArchivePage {
        station: String,
        #[source]
        source: HttpError,
    },
    #[error("no archive identifier found for station {station}")]
    Resolution { station: String },
    #[error("invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Resolves a station identifier to its archive target. The scheduler only
/// needs this half of discovery, so it is a seam of its own.
pub trait ArchiveResolver: Send + Sync {
    fn resolve_archive(&self, station: &str) -> Result<ArchiveTarget, DiscoveryError>;
}

/// Blocking discovery client; call from `spawn_blocking` if used from async code.
#[derive(Clone)]
pub struct DiscoveryClient {
    pages: Arc<dyn PageFetcher>,
    search_url: String,
    archive_page_url: String,
}

impl DiscoveryClient {
    pub fn new(
        pages: Arc<dyn PageFetcher>,
        search_url: impl Into<String>,
        archive_page_url: impl Into<String>,
    ) -> Self {
        Self {
            pages,
            search_url: search_url.into(),
            archive_page_url: archive_page_url.into(),
        }
    }

    /// libcurl-backed client for the endpoints in `cfg`.
    pub fn from_config(cfg: &AtcarcConfig) -> Self {
        let timeouts = HttpTimeouts::new(
            Duration::from_secs(cfg.fetch.connect_timeout_secs),
            Duration::from_secs(cfg.fetch.page_timeout_secs),
        );
        Self::new(
            Arc::new(CurlPageFetcher::new(timeouts)),
            cfg.search_url.clone(),
            cfg.archive_page_url.clone(),
        )
    }

    fn endpoint(&self, base: &str, key: &str, value: &str) -> Result<String, DiscoveryError> {
        url::Url::parse_with_params(base, &[(key, value)])
            .map(String::from)
            .map_err(|e| DiscoveryError::InvalidUrl {
                url: base.to_string(),
                reason: e.to_string(),
            })
    }

    /// Stations listed for an ICAO code, in page order.
    pub fn list_stations(&self, icao: &str) -> Result<Vec<Station>, DiscoveryError> {
        let icao = icao.trim().to_ascii_uppercase();
        let url = self.endpoint(&self.search_url, "icao", &icao)?;
        tracing::debug!(%url, "searching stations");
        let markup = get_with_tls_fallback(self.pages.as_ref(), &url).map_err(|source| {
            DiscoveryError::Network {
                icao: icao.clone(),
                source,
            }
        })?;
        let stations =
            parse_stations(&markup).map_err(|source| DiscoveryError::Parse {
                icao: icao.clone(),
                source,
            })?;
        tracing::info!(icao = %icao, count = stations.len(), "station search complete");
        Ok(stations)
    }

    /// Current archive identifier and airport directory for `station`.
    pub fn resolve_archive(&self, station: &str) -> Result<ArchiveTarget, DiscoveryError> {
        let url = self.endpoint(&self.archive_page_url, "m", station)?;
        tracing::debug!(%url, "resolving archive identifier");
        let markup = get_with_tls_fallback(self.pages.as_ref(), &url).map_err(|source| {
            DiscoveryError::ArchivePage {
                station: station.to_string(),
                source,
            }
        })?;
        let resolution = || DiscoveryError::Resolution {
            station: station.to_string(),
        };
        let archive_id = parse_selected_option(&markup).ok_or_else(resolution)?;
        let prefix = airport_prefix(station);
        if prefix.is_empty() {
            return Err(resolution());
        }
        tracing::info!(station, archive_id = %archive_id, airport = prefix, "archive resolved");
        Ok(ArchiveTarget {
            archive_id,
            airport_prefix: prefix.to_string(),
        })
    }
}

impl ArchiveResolver for DiscoveryClient {
    fn resolve_archive(&self, station: &str) -> Result<ArchiveTarget, DiscoveryError> {
        DiscoveryClient::resolve_archive(self, station)
    }
}
