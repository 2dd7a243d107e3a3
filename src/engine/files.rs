//! File helpers shared by the engine and compaction
//!
//! Positioned reads/writes and directory syncing.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Suffix of the temporary files written during compaction
pub(crate) const COMPACT_SUFFIX: &str = "compact";

/// Open an existing file for read/write, creating it empty if missing
pub(crate) fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Create (or truncate) a file for writing
pub(crate) fn create_truncated(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Write `bytes` at `offset`; writing past EOF grows the file
pub(crate) fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    #[cfg(test)]
    faults::check()?;

    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

/// Read exactly `len` bytes at `offset`
pub(crate) fn read_at(file: &mut File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Temporary sibling of `path` used while compacting
/// "store.dat" → "store.dat.compact"
pub(crate) fn compact_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(COMPACT_SUFFIX);
    PathBuf::from(name)
}

/// Make renames and creations inside `dir` durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Directory handles cannot be synced on this platform
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
