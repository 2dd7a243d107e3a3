//! Directory table implementation
//!
//! Ordered slot list with an id → slot map and a set of reusable slots.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;

use tracing::warn;

use crate::error::{Result, StoreError};

use super::record::{decode, AllocationRecord, RECORD_SIZE};

/// In-memory view of the index file
///
/// ## Invariants
/// - every bound id maps to a slot holding a record with that id
/// - every empty slot is in `free_slots`
/// - `len()` (directory size) never shrinks outside compaction
/// - a record whose id is bound to another slot is stale: hidden from
///   [`get`](Self::get) and [`live_records`](Self::live_records)
#[derive(Debug, Default)]
pub struct DirectoryTable {
    /// Slot i ↔ index file bytes [i * 16, i * 16 + 16)
    slots: Vec<Option<AllocationRecord>>,

    /// Object id → slot index
    id_to_slot: HashMap<u64, usize>,

    /// Empty slots, lowest first
    free_slots: BTreeSet<usize>,
}

/// Result of scanning an index file
#[derive(Debug)]
pub struct DirectoryLoad {
    /// The rebuilt table
    pub table: DirectoryTable,

    /// Slots whose id was already claimed by an earlier slot.
    /// They are empty in `table` and the caller should tombstone them on disk.
    pub duplicate_slots: Vec<usize>,
}

impl DirectoryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table from an index file of `byte_len` bytes
    ///
    /// Fails with `Corruption` when `byte_len` is not a whole number of
    /// records or a record is malformed.
    pub fn load<R: Read>(mut reader: R, byte_len: u64) -> Result<DirectoryLoad> {
        if byte_len % RECORD_SIZE as u64 != 0 {
            return Err(StoreError::Corruption(format!(
                "index file length {} is not a multiple of {}",
                byte_len, RECORD_SIZE
            )));
        }

        let slot_count = (byte_len / RECORD_SIZE as u64) as usize;
        let mut table = Self {
            slots: Vec::with_capacity(slot_count),
            ..Self::default()
        };
        let mut duplicate_slots = Vec::new();

        let mut chunk = [0u8; RECORD_SIZE];
        for slot in 0..slot_count {
            reader.read_exact(&mut chunk)?;

            match decode(&chunk)? {
                Some(record) if table.id_to_slot.contains_key(&record.id) => {
                    // Left behind by an interrupted overwrite; first slot wins
                    warn!(
                        slot,
                        id = record.id,
                        "duplicate directory record, dropping later slot"
                    );
                    table.slots.push(None);
                    table.free_slots.insert(slot);
                    duplicate_slots.push(slot);
                }
                Some(record) => {
                    table.slots.push(Some(record));
                    table.id_to_slot.insert(record.id, slot);
                }
                None => {
                    table.slots.push(None);
                    table.free_slots.insert(slot);
                }
            }
        }

        Ok(DirectoryLoad {
            table,
            duplicate_slots,
        })
    }

    /// Place a record in the lowest empty slot, or append a new slot
    ///
    /// Does not bind the id; call [`bind`](Self::bind) once the record is
    /// durable.
    pub fn allocate_slot(&mut self, record: AllocationRecord) -> usize {
        match self.free_slots.pop_first() {
            Some(slot) => {
                self.slots[slot] = Some(record);
                slot
            }
            None => {
                self.slots.push(Some(record));
                self.slots.len() - 1
            }
        }
    }

    /// Undo an [`allocate_slot`](Self::allocate_slot) whose record was
    /// never bound
    ///
    /// `prior_len` is the directory size before the allocation; an
    /// appended slot is removed again, a reused one goes back on the free set.
    pub fn release_slot(&mut self, slot: usize, prior_len: usize) {
        if slot >= prior_len {
            self.slots.truncate(prior_len);
        } else if let Some(entry) = self.slots.get_mut(slot) {
            *entry = None;
            self.free_slots.insert(slot);
        }
    }

    /// Point `id` at `slot`, replacing any previous mapping
    pub fn bind(&mut self, id: u64, slot: usize) {
        self.id_to_slot.insert(id, slot);
    }

    /// Empty a slot and track it for reuse
    ///
    /// The id mapping is dropped only if it still points at this slot, so
    /// freeing the old slot of an overwrite leaves the new binding alone.
    /// Returns the record that occupied the slot.
    pub fn free_slot(&mut self, slot: usize) -> Option<AllocationRecord> {
        let record = self.slots.get_mut(slot)?.take()?;

        if self.id_to_slot.get(&record.id) == Some(&slot) {
            self.id_to_slot.remove(&record.id);
        }
        self.free_slots.insert(slot);

        Some(record)
    }

    /// Slot currently bound to `id`
    pub fn lookup(&self, id: u64) -> Option<usize> {
        self.id_to_slot.get(&id).copied()
    }

    /// Record stored in `slot`, if the slot is live and its id is bound to it
    pub fn get(&self, slot: usize) -> Option<AllocationRecord> {
        self.slots
            .get(slot)
            .copied()
            .flatten()
            .filter(|record| self.id_to_slot.get(&record.id) == Some(&slot))
    }

    /// Directory size: number of slots, empty ones included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live objects
    pub fn live_count(&self) -> usize {
        self.id_to_slot.len()
    }

    /// Number of empty slots awaiting reuse
    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    /// True if any slot is empty
    pub fn has_holes(&self) -> bool {
        !self.free_slots.is_empty()
    }

    /// Live records in slot order
    ///
    /// Only slots their id is bound to are yielded.
    pub fn live_records(&self) -> impl Iterator<Item = (usize, AllocationRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, record)| record.map(|r| (slot, r)))
            .filter(|(slot, record)| self.id_to_slot.get(&record.id) == Some(slot))
    }
}
