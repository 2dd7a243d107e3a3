//! Engine Module
//!
//! The storage engine that ties the directory, the block allocator and the
//! two store files together.
//!
//! ## Responsibilities
//! - Own the index and data file handles
//! - Rebuild directory and allocator state from the index file on open
//! - Add, load and remove objects
//! - Compact both files to drop tombstones and gaps
//! - Enforce the Unopened → Open → Closed lifecycle

mod compaction;
mod files;

pub use compaction::CompactionStats;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::allocator::{blocks_for, BlockAllocator, BLOCK_SIZE};
use crate::config::{StoreConfig, SyncMode};
use crate::directory::{
    encode, AllocationRecord, DirectoryLoad, DirectoryTable, EMPTY_RECORD, MAX_PAYLOAD_LEN,
    RECORD_SIZE,
};
use crate::error::{Result, StoreError};
use crate::object::{Factory, Storable};

use compaction::CompactError;
use files::{open_rw, read_at, write_at};

/// Block positions are u32, so an allocation must end at or before 2^32
const ADDRESSABLE_BLOCKS: u64 = 1 << 32;

/// A persistent, block-allocated object store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Mutations** (add/remove/compact/open/close): take the `state` write
///   lock, so only ONE runs at a time and never alongside a load
/// - **Reads** (load and accessors): take the `state` read lock and run
///   concurrently with each other
///   - the data file handle sits behind its own Mutex because reads seek
///
/// The store is `Send + Sync`; share it across threads with `Arc`.
pub struct BlockStore {
    /// Store configuration
    config: StoreConfig,

    /// Lifecycle state, holding the open files and in-memory tables
    state: RwLock<State>,
}

enum State {
    Unopened,
    Open(OpenStore),
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Unopened => "unopened",
            State::Open(_) => "open",
            State::Closed => "closed",
        }
    }
}

/// Point-in-time counters for an open store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Objects currently stored
    pub live_count: usize,
    /// Directory slots, tombstones included
    pub directory_size: usize,
    /// Tombstoned slots awaiting reuse
    pub free_slots: usize,
    /// Blocks occupied by live payloads
    pub used_blocks: u64,
    /// One past the highest occupied block
    pub block_extent: u64,
    /// Length of the data file in bytes
    pub data_file_len: u64,
}

/// Files and derived tables of an open store
struct OpenStore {
    /// Index file (16-byte records); only touched under the write lock
    index: File,

    /// Data file; locked separately so concurrent loads can seek
    data: Mutex<File>,

    /// Slots, id map and free-slot set rebuilt from `index`
    directory: DirectoryTable,

    /// Block occupancy derived from `directory`
    allocator: BlockAllocator,

    /// Current data file length
    data_len: u64,

    sync_mode: SyncMode,
}

impl BlockStore {
    /// Create an unopened store for the given config
    ///
    /// No file is touched until [`open`](Self::open).
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::Unopened),
        }
    }

    /// Create and open a store in one step
    pub fn open_with(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store.open()?;
        Ok(store)
    }

    /// Open with a directory and base name (convenience method)
    ///
    /// Uses default config otherwise
    pub fn open_path(dir: &Path, name: &str) -> Result<Self> {
        Self::open_with(StoreConfig::builder().data_dir(dir).name(name).build())
    }

    /// Open the store files and rebuild in-memory state
    ///
    /// On open:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Finish or discard an interrupted compaction
    /// 3. Open/create `<name>.idx` and `<name>.dat`
    /// 4. Scan the index into the directory table
    /// 5. Tombstone duplicate records and records the data file can't back
    /// 6. Derive block occupancy from the live records
    ///
    /// A closed store may be opened again.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.write();
        if let State::Open(_) = *state {
            return Err(invalid_state("open", "open"));
        }

        self.config.validate()?;
        let store = OpenStore::open(&self.config)?;

        info!(
            dir = %self.config.data_dir.display(),
            name = %self.config.name,
            live = store.directory.live_count(),
            slots = store.directory.len(),
            "opened store"
        );

        *state = State::Open(store);
        Ok(())
    }

    /// Sync and release both files
    ///
    /// Closing a closed store is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();

        match std::mem::replace(&mut *state, State::Closed) {
            State::Open(store) => {
                store.sync()?;
                info!(name = %self.config.name, "closed store");
                Ok(())
            }
            State::Closed => Ok(()),
            State::Unopened => {
                *state = State::Unopened;
                Err(invalid_state("close", "unopened"))
            }
        }
    }

    /// Add an object, replacing any object with the same id
    ///
    /// Steps:
    /// 1. Serialize (a failure here changes nothing)
    /// 2. Find the lowest free block run and write the payload
    /// 3. Write the new record into a reused or appended slot
    /// 4. Bind the id to the new slot
    /// 5. For an overwrite, tombstone the old slot and free its blocks
    ///
    /// A failure before step 4 leaves the store as it was. If only the
    /// tombstone write of step 5 fails, the error is returned with the new
    /// object already in place; the old slot and its blocks stay reserved
    /// (hidden from [`allocation`](Self::allocation)) until `compact` drops
    /// them. Reopening instead keeps whichever record comes first in the
    /// index.
    pub fn add<S: Storable + ?Sized>(&self, object: &S) -> Result<()> {
        self.with_open_mut("add", |store| {
            let payload = object.to_bytes()?;
            store.insert(object.id(), &payload)
        })
    }

    /// Load an object by id and rebuild it with `factory`
    ///
    /// Returns `Ok(None)` if no object has this id. Every call reads from
    /// disk.
    pub fn load<T, F>(&self, id: u64, factory: &F) -> Result<Option<T>>
    where
        F: Factory<T> + ?Sized,
    {
        match self.load_bytes(id)? {
            Some(bytes) => factory.restore(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Load the raw payload of an object
    pub fn load_bytes(&self, id: u64) -> Result<Option<Vec<u8>>> {
        self.with_open("load", |store| store.read_payload(id))
    }

    /// Remove an object by id
    ///
    /// Unknown ids are a no-op. The slot stays in the directory as a
    /// tombstone until reused or compacted away.
    /// Returns whether an object was removed.
    pub fn remove(&self, id: u64) -> Result<bool> {
        self.with_open_mut("remove", |store| store.remove(id))
    }

    /// Repack live payloads contiguously and drop tombstoned slots
    ///
    /// Afterwards `directory_size() == size()`. Compacting an already
    /// compact store does not rewrite anything.
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut state = self.state.write();
        let store = match &mut *state {
            State::Open(store) => store,
            other => return Err(invalid_state("compact", other.name())),
        };

        match store.compact(&self.config) {
            Ok(stats) => Ok(stats),
            Err(CompactError::Aborted(err)) => Err(err),
            Err(CompactError::Committed(err)) => {
                // The files on disk finish rolling forward on the next open
                error!(error = %err, "compaction failed after commit, closing store");
                *state = State::Closed;
                Err(err)
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of live objects
    pub fn size(&self) -> Result<usize> {
        self.with_open("size", |store| Ok(store.directory.live_count()))
    }

    /// Number of directory slots, tombstones included
    pub fn directory_size(&self) -> Result<usize> {
        self.with_open("directory_size", |store| Ok(store.directory.len()))
    }

    /// Allocation record stored in `slot`, if the slot is live
    pub fn allocation(&self, slot: usize) -> Result<Option<AllocationRecord>> {
        self.with_open("allocation", |store| Ok(store.directory.get(slot)))
    }

    /// Check whether an object with this id is stored
    pub fn contains(&self, id: u64) -> Result<bool> {
        self.with_open("contains", |store| Ok(store.directory.lookup(id).is_some()))
    }

    /// Ids of all live objects, in slot order
    pub fn ids(&self) -> Result<Vec<u64>> {
        self.with_open("ids", |store| {
            Ok(store.directory.live_records().map(|(_, r)| r.id).collect())
        })
    }

    /// Counters describing the store
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_open("stats", |store| Ok(store.stats()))
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.read(), State::Open(_))
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Index and data file paths, in that order
    pub fn paths(&self) -> (PathBuf, PathBuf) {
        (self.config.index_path(), self.config.data_path())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn with_open<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&OpenStore) -> Result<R>,
    ) -> Result<R> {
        let state = self.state.read();
        match &*state {
            State::Open(store) => f(store),
            other => Err(invalid_state(operation, other.name())),
        }
    }

    fn with_open_mut<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut OpenStore) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.write();
        match &mut *state {
            State::Open(store) => f(store),
            other => Err(invalid_state(operation, other.name())),
        }
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        if let State::Open(store) = self.state.get_mut() {
            if let Err(err) = store.sync() {
                warn!(error = %err, "failed to sync store on drop");
            }
        }
    }
}

impl OpenStore {
    fn open(config: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        compaction::recover(config)?;

        let mut index = open_rw(&config.index_path())?;
        let data = open_rw(&config.data_path())?;

        let index_len = index.metadata()?.len();
        let DirectoryLoad {
            table: mut directory,
            duplicate_slots,
        } = DirectoryTable::load(BufReader::new(&index), index_len)?;

        // Left behind when the index reached disk before the data file did
        let data_len = data.metadata()?.len();
        let unbacked = unbacked_slots(&directory, data_len);
        for &slot in &unbacked {
            if let Some(record) = directory.free_slot(slot) {
                warn!(
                    slot,
                    id = record.id,
                    position = record.position,
                    length = record.length,
                    "record points past the end of the data file, dropping it"
                );
            }
        }

        if !duplicate_slots.is_empty() || !unbacked.is_empty() {
            for &slot in duplicate_slots.iter().chain(&unbacked) {
                write_at(&mut index, slot_offset(slot), &EMPTY_RECORD)?;
            }
            index.sync_data()?;
            warn!(
                duplicates = duplicate_slots.len(),
                unbacked = unbacked.len(),
                "tombstoned stale directory records"
            );
        }

        let mut allocator = BlockAllocator::new();
        for (slot, record) in directory.live_records() {
            if !allocator.is_range_free(record.position, record.blocks_needed()) {
                return Err(StoreError::Corruption(format!(
                    "slot {} (id {:#x}) overlaps another allocation at block {}",
                    slot, record.id, record.position
                )));
            }
            allocator.mark_used(record.position, record.blocks_needed());
        }

        Ok(Self {
            index,
            data: Mutex::new(data),
            directory,
            allocator,
            data_len,
            sync_mode: config.sync_mode,
        })
    }

    fn insert(&mut self, id: u64, payload: &[u8]) -> Result<()> {
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|&len| len <= MAX_PAYLOAD_LEN)
            .ok_or_else(|| {
                StoreError::Capacity(format!(
                    "payload of {} bytes exceeds the {} byte limit",
                    payload.len(),
                    MAX_PAYLOAD_LEN
                ))
            })?;

        let blocks = blocks_for(length);
        let start = self.allocator.find_free_region(blocks);
        let position = u32::try_from(start)
            .ok()
            .filter(|&pos| u64::from(pos) + u64::from(blocks) <= ADDRESSABLE_BLOCKS)
            .ok_or_else(|| {
                StoreError::Capacity(format!(
                    "no room for {} blocks in the block address space",
                    blocks
                ))
            })?;

        let record = AllocationRecord::new(id, position, length);
        let previous = self
            .directory
            .lookup(id)
            .and_then(|slot| self.directory.get(slot).map(|old| (slot, old)));

        // Old blocks stay marked until the new record is durable, so the
        // new payload never lands on top of the one it replaces
        self.allocator.mark_used(position, blocks);
        if let Err(err) = self.write_payload(&record, payload) {
            self.allocator.mark_free(position, blocks);
            return Err(err);
        }

        let slots_before = self.directory.len();
        let slot = self.directory.allocate_slot(record);
        if let Err(err) = self.write_record(slot, &encode(&record)) {
            self.directory.release_slot(slot, slots_before);
            if slot >= slots_before {
                // Keep the index a whole number of records
                if let Err(trim_err) = self.index.set_len(slot_offset(slot)) {
                    warn!(error = %trim_err, slot, "failed to trim index after failed append");
                }
            }
            self.allocator.mark_free(position, blocks);
            return Err(err);
        }
        self.directory.bind(id, slot);

        if let Some((old_slot, old)) = previous {
            self.write_record(old_slot, &EMPTY_RECORD)?;
            self.directory.free_slot(old_slot);
            self.allocator.mark_free(old.position, old.blocks_needed());
            debug!(id, old_slot, "retired previous record");
        }

        debug!(id, slot, position, length, "added object");
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<bool> {
        let Some(slot) = self.directory.lookup(id) else {
            return Ok(false);
        };
        let Some(record) = self.directory.get(slot) else {
            return Ok(false);
        };

        self.write_record(slot, &EMPTY_RECORD)?;
        self.directory.free_slot(slot);
        self.allocator.mark_free(record.position, record.blocks_needed());

        debug!(id, slot, "removed object");
        Ok(true)
    }

    fn read_payload(&self, id: u64) -> Result<Option<Vec<u8>>> {
        let Some(record) = self
            .directory
            .lookup(id)
            .and_then(|slot| self.directory.get(slot))
        else {
            return Ok(None);
        };

        let mut data = self.data.lock();
        let bytes = read_at(&mut data, record.byte_offset(), record.length as usize)?;
        Ok(Some(bytes))
    }

    fn write_payload(&mut self, record: &AllocationRecord, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }

        let offset = record.byte_offset();
        let data = self.data.get_mut();
        write_at(data, offset, payload)?;
        self.data_len = self.data_len.max(offset + payload.len() as u64);

        if self.sync_mode == SyncMode::Always {
            data.sync_data()?;
        }
        Ok(())
    }

    fn write_record(&mut self, slot: usize, bytes: &[u8; RECORD_SIZE]) -> Result<()> {
        write_at(&mut self.index, slot_offset(slot), bytes)?;
        if self.sync_mode == SyncMode::Always {
            self.index.sync_data()?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.index.sync_all()?;
        self.data.lock().sync_all()?;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            live_count: self.directory.live_count(),
            directory_size: self.directory.len(),
            free_slots: self.directory.free_slot_count(),
            used_blocks: self.allocator.used_blocks(),
            block_extent: self.allocator.end(),
            data_file_len: self.data_len,
        }
    }
}

/// Live slots whose record the data file cannot back
///
/// A non-empty payload must end inside the data file. An empty payload
/// holds no bytes, but its block still lies below the file's block count
/// plus the directory size.
fn unbacked_slots(directory: &DirectoryTable, data_len: u64) -> Vec<usize> {
    let block_limit = data_len.div_ceil(u64::from(BLOCK_SIZE)) + directory.len() as u64;

    directory
        .live_records()
        .filter(|(_, record)| {
            if record.length == 0 {
                u64::from(record.position) >= block_limit
            } else {
                record.byte_offset() + u64::from(record.length) > data_len
            }
        })
        .map(|(slot, _)| slot)
        .collect()
}

/// Byte offset of a directory slot in the index file
fn slot_offset(slot: usize) -> u64 {
    slot as u64 * RECORD_SIZE as u64
}

fn invalid_state(operation: &'static str, state: &'static str) -> StoreError {
    StoreError::InvalidState { operation, state }
}
