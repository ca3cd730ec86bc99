//! Pure markup → data model extraction for the LiveATC search and archive pages.
//!
//! The upstream pages are unversioned scraped HTML; everything that depends on
//! their shape lives here so markup drift stays a one-file change.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use thiserror::Error;

use super::{Frequency, Station};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Body is not an HTML document (empty, JSON, plain-text error page, ...).
    #[error("response is not an HTML page")]
    NotHtml,
    /// Station blocks and frequency tables are paired by position; a mismatch means the layout changed.
    #[error("found {stations} station blocks but {frequency_tables} frequency tables")]
    CountMismatch {
        stations: usize,
        frequency_tables: usize,
    },
    #[error("station block {position} has no title")]
    MissingTitle { position: usize },
    #[error("station block {position} has no archive link")]
    MissingArchiveLink { position: usize },
    #[error("archive link {href:?} has no station identifier")]
    BadArchiveLink { href: String },
}

fn selector(cell: &'static OnceLock<Selector>, css: &'static str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector"))
}

fn station_block_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    // Layout tables share the `body` class but are rendered with padding="0".
    selector(&SEL, r#"table.body[border="0"]:not([padding="0"])"#)
}

fn freq_table_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, r#"table.freqTable[colspan="2"]"#)
}

fn strong_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "strong")
}

fn font_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "font")
}

fn link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "a[href]")
}

fn row_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "tr")
}

fn cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "td")
}

fn selected_option_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "option[selected]")
}

/// `archive.php?m=<identifier>`, identifier limited to `[A-Za-z0-9_]`.
fn archive_href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"archive\.php\?m=([A-Za-z0-9_]+)").expect("static regex"))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extract the station identifier from an archive link href.
pub fn station_id_from_href(href: &str) -> Option<&str> {
    archive_href_pattern()
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Interpret the free-text feed status marker (`UP`, ` Up `, `DOWN`, ...).
pub fn parse_liveness(marker: &str) -> bool {
    marker
        .split_whitespace()
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("up"))
}

fn looks_like_html(markup: &str) -> bool {
    let head: String = markup.chars().take(4096).collect::<String>().to_ascii_lowercase();
    head.contains("<html") || head.contains("<body") || head.contains("<!doctype html")
}

/// Parse the search results page into stations, pairing each station block
/// with the frequency table at the same position.
pub fn parse_stations(markup: &str) -> Result<Vec<Station>, ParseError> {
    let doc = Html::parse_document(markup);
    let blocks: Vec<ElementRef<'_>> = doc.select(station_block_selector()).collect();
    let tables: Vec<ElementRef<'_>> = doc.select(freq_table_selector()).collect();

    if blocks.is_empty() && tables.is_empty() {
        return if looks_like_html(markup) {
            Ok(Vec::new())
        } else {
            Err(ParseError::NotHtml)
        };
    }
    if blocks.len() != tables.len() {
        return Err(ParseError::CountMismatch {
            stations: blocks.len(),
            frequency_tables: tables.len(),
        });
    }

    blocks
        .into_iter()
        .zip(tables)
        .enumerate()
        .map(|(position, (block, table))| parse_station(position, block, table))
        .collect()
}

fn parse_station(
    position: usize,
    block: ElementRef<'_>,
    table: ElementRef<'_>,
) -> Result<Station, ParseError> {
    let title = block
        .select(strong_selector())
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingTitle { position })?;

    let is_up = block
        .select(font_selector())
        .next()
        .map(|f| parse_liveness(&text_of(f)))
        .unwrap_or(false);

    let href = block
        .select(link_selector())
        .filter_map(|a| a.value().attr("href"))
        .find(|h| h.contains("archive.php"))
        .ok_or(ParseError::MissingArchiveLink { position })?;
    let identifier = station_id_from_href(href)
        .ok_or_else(|| ParseError::BadArchiveLink {
            href: href.to_string(),
        })?
        .to_string();

    Ok(Station {
        identifier,
        title,
        is_up,
        frequencies: parse_frequencies(table),
    })
}

/// Rows after the header row; rows with fewer than two cells are skipped.
fn parse_frequencies(table: ElementRef<'_>) -> Vec<Frequency> {
    table
        .select(row_selector())
        .skip(1)
        .filter_map(|row| {
            let mut cells = row.select(cell_selector());
            let label = text_of(cells.next()?);
            let frequency = text_of(cells.next()?);
            Some(Frequency { label, frequency })
        })
        .collect()
}

/// Value of the pre-selected `<option>` on a station's archive page: the
/// canonical prefix of its archive filenames (e.g. `KPDX-App-Dep`).
pub fn parse_selected_option(markup: &str) -> Option<String> {
    let doc = Html::parse_document(markup);
    let value = doc
        .select(selected_option_selector())
        .filter_map(|o| o.value().attr("value"))
        .map(str::trim)
        .find(|v| !v.is_empty())?;
    Some(value.to_string())
}
