//! Crash-safe replacement of a file's content
//!
//! Bytes go to a temp file in the target's directory, are synced, then renamed
//! over the target. Readers see either the old document or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

const TEMP_PREFIX: &str = ".sunmoon-cache-";
const TEMP_SUFFIX: &str = ".tmp";

/// Atomically replaces `final_path` with `bytes`
///
/// `dir` must be the directory containing `final_path` so the rename stays on
/// one filesystem. It is created if missing.
///
/// # Errors
/// Returns the underlying I/O error. The temp file is removed and
/// `final_path` keeps its previous content.
pub fn write_atomic(dir: &Path, final_path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    write_synced(&mut tmp, bytes)?;

    // On failure `PersistError` hands the temp file back; dropping it deletes it.
    tmp.persist(final_path).map_err(|e| e.error)?;
    Ok(())
}

fn write_synced(tmp: &mut NamedTempFile, bytes: &[u8]) -> io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()
}
