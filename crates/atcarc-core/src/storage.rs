//! Staging files and hand-off to the destination folder.
//!
//! Segments are written to `<name>.part` in the staging directory and renamed
//! to `<name>` only once complete, so a staged file is always whole.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `a.mp3` → `a.mp3.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Remove a leftover file; a missing file is not an error.
pub fn discard(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Atomically rename a completed temp file to its final staging path.
pub fn finalize(temp: &Path, final_path: &Path) -> io::Result<()> {
    fs::rename(temp, final_path)
}

/// Move a staged file into `dest_dir`, keeping its file name. Falls back to
/// copy + remove when the rename crosses filesystems (e.g. /tmp on tmpfs).
pub fn move_into(staged: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = staged
        .file_name()
        .with_context(|| format!("staged path has no file name: {}", staged.display()))?;
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;
    let dest = dest_dir.join(name);
    if fs::rename(staged, &dest).is_ok() {
        return Ok(dest);
    }
    tracing::debug!(from = %staged.display(), to = %dest.display(), "rename failed, copying");
    let tmp = temp_path(&dest);
    fs::copy(staged, &tmp)
        .with_context(|| format!("failed to copy {} to {}", staged.display(), tmp.display()))?;
    fs::rename(&tmp, &dest)
        .with_context(|| format!("failed to rename {} to {}", tmp.display(), dest.display()))?;
    discard(staged).with_context(|| format!("failed to remove {}", staged.display()))?;
    Ok(dest)
}
