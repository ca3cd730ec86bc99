//! Airport directory prefix used in archive file URLs.

/// Letters-only airport code for a station identifier: the part before the
/// first `_`, with any trailing digits removed (`kcho3_zdc_121675` -> `kcho`).
pub fn airport_prefix(station: &str) -> &str {
    let head = station.split('_').next().unwrap_or(station);
    head.trim_end_matches(|c: char| c.is_ascii_digit())
}
