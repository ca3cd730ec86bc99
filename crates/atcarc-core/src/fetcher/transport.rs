//! Uniform contract for the ordered transport fallback chain.

use std::path::Path;

use crate::retry::FetchError;

/// One way of getting a segment onto disk. Implementations write the full
/// body to `dest` (creating or truncating it) and return the bytes written;
/// on failure `dest` may hold partial data that the caller discards.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}
