//! Compaction
//!
//! Rewrites both store files so live payloads sit back to back from block 0
//! and the directory holds no tombstones.
//!
//! ## Commit Protocol
//! ```text
//! 1. write  {name}.dat.compact, {name}.idx.compact   (synced)
//! 2. create {name}.compact                           ← commit point
//! 3. rename {name}.dat.compact → {name}.dat
//!    rename {name}.idx.compact → {name}.idx
//! 4. remove {name}.compact
//! ```
//!
//! On open, a present marker means steps 3-4 are replayed (roll forward);
//! stray `.compact` files without a marker are deleted (roll back).

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::directory::{encode, AllocationRecord};
use crate::error::{Result, StoreError};

use super::files::{compact_path, create_truncated, read_at, sync_dir};
use super::OpenStore;

/// Outcome of a compaction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionStats {
    /// True if the store was already compact and nothing was rewritten
    pub skipped: bool,
    /// Objects carried over
    pub live_count: usize,
    /// Tombstoned slots dropped from the directory
    pub slots_dropped: usize,
    /// Block extent before compaction
    pub blocks_before: u64,
    /// Block extent after compaction
    pub blocks_after: u64,
    /// Data file length before compaction
    pub bytes_before: u64,
    /// Data file length after compaction
    pub bytes_after: u64,
}

/// Failure split by whether the commit point was passed
pub(super) enum CompactError {
    /// Nothing on disk changed; the open store is still valid
    Aborted(StoreError),
    /// The marker was written; the open handles are stale
    Committed(StoreError),
}

impl OpenStore {
    pub(super) fn compact(
        &mut self,
        config: &StoreConfig,
    ) -> std::result::Result<CompactionStats, CompactError> {
        let live: Vec<AllocationRecord> =
            self.directory.live_records().map(|(_, r)| r).collect();
        let target = plan(&live).map_err(CompactError::Aborted)?;
        let packed_len = target
            .last()
            .map_or(0, |r| r.byte_offset() + u64::from(r.length));

        let mut stats = CompactionStats {
            skipped: false,
            live_count: live.len(),
            slots_dropped: self.directory.len() - live.len(),
            blocks_before: self.allocator.end(),
            blocks_after: target.last().map_or(0, |r| r.end_block()),
            bytes_before: self.data_len,
            bytes_after: packed_len,
        };

        if stats.slots_dropped == 0 && live == target && self.data_len == packed_len {
            debug!(live = live.len(), "store already compact");
            stats.skipped = true;
            return Ok(stats);
        }

        let data_tmp = compact_path(&config.data_path());
        let index_tmp = compact_path(&config.index_path());

        let written = self
            .write_compacted(&live, &target, &data_tmp, &index_tmp)
            .and_then(|()| write_marker(config));
        if let Err(err) = written {
            discard(&data_tmp);
            discard(&index_tmp);
            discard(&config.compact_marker_path());
            return Err(CompactError::Aborted(err));
        }

        swap_in(config, &data_tmp, &index_tmp).map_err(CompactError::Committed)?;
        *self = OpenStore::open(config).map_err(CompactError::Committed)?;

        info!(
            live = stats.live_count,
            slots_dropped = stats.slots_dropped,
            blocks_before = stats.blocks_before,
            blocks_after = stats.blocks_after,
            "compacted store"
        );
        Ok(stats)
    }

    /// Write the packed data and index files next to the live ones
    fn write_compacted(
        &mut self,
        live: &[AllocationRecord],
        target: &[AllocationRecord],
        data_tmp: &Path,
        index_tmp: &Path,
    ) -> Result<()> {
        let mut data_out = BufWriter::new(create_truncated(data_tmp)?);
        let mut index_out = BufWriter::new(create_truncated(index_tmp)?);
        let source = self.data.get_mut();

        let mut written = 0u64;
        for (old, new) in live.iter().zip(target) {
            let payload = read_at(source, old.byte_offset(), old.length as usize)?;

            // Zero-fill the tail of the previous block
            let pad = new.byte_offset() - written;
            io::copy(&mut io::repeat(0).take(pad), &mut data_out)?;
            data_out.write_all(&payload)?;
            written = new.byte_offset() + payload.len() as u64;

            index_out.write_all(&encode(new))?;
        }

        finish(data_out)?;
        finish(index_out)?;
        Ok(())
    }
}

/// Target layout: same records in slot order, packed from block 0
fn plan(live: &[AllocationRecord]) -> Result<Vec<AllocationRecord>> {
    let mut next = 0u64;
    live.iter()
        .map(|record| {
            let position = u32::try_from(next).map_err(|_| {
                StoreError::Capacity("packed layout exceeds the block address space".to_string())
            })?;
            next += u64::from(record.blocks_needed());
            Ok(AllocationRecord::new(record.id, position, record.length))
        })
        .collect()
}

/// Finish or discard a compaction interrupted by a crash
pub(super) fn recover(config: &StoreConfig) -> Result<()> {
    let marker = config.compact_marker_path();
    let pairs = [
        (compact_path(&config.data_path()), config.data_path()),
        (compact_path(&config.index_path()), config.index_path()),
    ];

    if marker.exists() {
        for (tmp, live) in &pairs {
            if tmp.exists() {
                fs::rename(tmp, live)?;
            }
        }
        sync_dir(&config.data_dir)?;
        fs::remove_file(&marker)?;
        sync_dir(&config.data_dir)?;
        info!(name = %config.name, "rolled forward interrupted compaction");
    } else {
        for (tmp, _) in &pairs {
            if tmp.exists() {
                fs::remove_file(tmp)?;
                warn!(path = %tmp.display(), "discarded incomplete compaction file");
            }
        }
    }

    Ok(())
}

/// Create the commit marker once both new files are durable
fn write_marker(config: &StoreConfig) -> Result<()> {
    create_truncated(&config.compact_marker_path())?.sync_all()?;
    sync_dir(&config.data_dir)?;
    Ok(())
}

/// Move the new files over the live ones and clear the marker
fn swap_in(config: &StoreConfig, data_tmp: &Path, index_tmp: &Path) -> Result<()> {
    fs::rename(data_tmp, config.data_path())?;
    fs::rename(index_tmp, config.index_path())?;
    sync_dir(&config.data_dir)?;
    fs::remove_file(config.compact_marker_path())?;
    sync_dir(&config.data_dir)?;
    Ok(())
}

fn finish(writer: BufWriter<File>) -> Result<()> {
    let file = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove compaction file");
        }
    }
}
