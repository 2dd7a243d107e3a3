//! Tests for DirectoryTable
//!
//! These tests verify:
//! - Rebuilding the table from index file bytes
//! - Rejecting index files that are not whole records
//! - Lowest-first reuse of empty slots
//! - Id binding across overwrites and frees
//! - Duplicate ids left by an interrupted overwrite

use std::io::Cursor;

use atlasstore::directory::{encode, AllocationRecord, DirectoryTable, EMPTY_RECORD};
use atlasstore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Build index file bytes; `None` is a tombstone
fn index_bytes(slots: &[Option<AllocationRecord>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for slot in slots {
        match slot {
            Some(record) => bytes.extend_from_slice(&encode(record)),
            None => bytes.extend_from_slice(&EMPTY_RECORD),
        }
    }
    bytes
}

fn load(bytes: &[u8]) -> DirectoryTable {
    DirectoryTable::load(Cursor::new(bytes), bytes.len() as u64)
        .unwrap()
        .table
}

// =============================================================================
// Load Tests
// =============================================================================

#[test]
fn test_load_empty_index() {
    let table = load(&[]);

    assert_eq!(table.len(), 0);
    assert_eq!(table.live_count(), 0);
    assert!(table.is_empty());
    assert!(!table.has_holes());
}

#[test]
fn test_load_mixed_slots() {
    let a = AllocationRecord::new(10, 0, 100);
    let b = AllocationRecord::new(20, 1, 600);
    let bytes = index_bytes(&[Some(a), None, Some(b)]);

    let table = load(&bytes);

    assert_eq!(table.len(), 3);
    assert_eq!(table.live_count(), 2);
    assert_eq!(table.free_slot_count(), 1);
    assert_eq!(table.lookup(10), Some(0));
    assert_eq!(table.lookup(20), Some(2));
    assert_eq!(table.get(0), Some(a));
    assert_eq!(table.get(1), None);
    assert_eq!(table.get(2), Some(b));
}

#[test]
fn test_load_rejects_partial_record() {
    let mut bytes = index_bytes(&[Some(AllocationRecord::new(1, 0, 1))]);
    bytes.push(0xFF);

    let result = DirectoryTable::load(Cursor::new(&bytes), bytes.len() as u64);

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

#[test]
fn test_load_rejects_unflagged_record() {
    let mut bytes = index_bytes(&[Some(AllocationRecord::new(1, 0, 1))]);
    bytes[12] = 0;

    let result = DirectoryTable::load(Cursor::new(&bytes), bytes.len() as u64);

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

#[test]
fn test_load_keeps_first_of_duplicate_ids() {
    let first = AllocationRecord::new(5, 0, 10);
    let second = AllocationRecord::new(5, 1, 20);
    let bytes = index_bytes(&[Some(first), Some(second)]);

    let loaded = DirectoryTable::load(Cursor::new(&bytes), bytes.len() as u64).unwrap();

    assert_eq!(loaded.duplicate_slots, vec![1]);
    assert_eq!(loaded.table.lookup(5), Some(0));
    assert_eq!(loaded.table.get(1), None);
    assert_eq!(loaded.table.live_count(), 1);
    assert_eq!(loaded.table.len(), 2);
}

// =============================================================================
// Slot Allocation Tests
// =============================================================================

#[test]
fn test_allocate_appends_when_no_holes() {
    let mut table = DirectoryTable::new();

    let s0 = table.allocate_slot(AllocationRecord::new(1, 0, 1));
    let s1 = table.allocate_slot(AllocationRecord::new(2, 1, 1));

    assert_eq!((s0, s1), (0, 1));
    assert_eq!(table.len(), 2);
}

#[test]
fn test_allocate_reuses_lowest_free_slot() {
    let records: Vec<_> = (0..4)
        .map(|i| Some(AllocationRecord::new(100 + i, i as u32, 1)))
        .collect();
    let mut table = load(&index_bytes(&records));

    table.free_slot(3);
    table.free_slot(1);

    let slot = table.allocate_slot(AllocationRecord::new(200, 9, 1));
    assert_eq!(slot, 1);

    let slot = table.allocate_slot(AllocationRecord::new(201, 10, 1));
    assert_eq!(slot, 3);

    let slot = table.allocate_slot(AllocationRecord::new(202, 11, 1));
    assert_eq!(slot, 4);
    assert_eq!(table.len(), 5);
}

#[test]
fn test_free_slot_keeps_directory_size() {
    let mut table = load(&index_bytes(&[Some(AllocationRecord::new(1, 0, 1))]));

    let freed = table.free_slot(0);

    assert_eq!(freed, Some(AllocationRecord::new(1, 0, 1)));
    assert_eq!(table.len(), 1);
    assert_eq!(table.live_count(), 0);
    assert_eq!(table.lookup(1), None);
    assert!(table.has_holes());
}

#[test]
fn test_free_slot_out_of_range_or_empty() {
    let mut table = load(&index_bytes(&[None]));

    assert_eq!(table.free_slot(0), None);
    assert_eq!(table.free_slot(42), None);
    assert_eq!(table.free_slot_count(), 1);
}

// =============================================================================
// Binding Tests
// =============================================================================

#[test]
fn test_allocate_does_not_bind() {
    let mut table = DirectoryTable::new();

    let slot = table.allocate_slot(AllocationRecord::new(7, 0, 1));
    assert_eq!(table.lookup(7), None);

    table.bind(7, slot);
    assert_eq!(table.lookup(7), Some(slot));
}

#[test]
fn test_overwrite_keeps_new_binding_when_old_slot_freed() {
    let mut table = DirectoryTable::new();
    let old = table.allocate_slot(AllocationRecord::new(7, 0, 1));
    table.bind(7, old);

    let new = table.allocate_slot(AllocationRecord::new(7, 1, 1));
    table.bind(7, new);
    table.free_slot(old);

    assert_eq!(table.lookup(7), Some(new));
    assert_eq!(table.live_count(), 1);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_live_records_in_slot_order() {
    let a = AllocationRecord::new(30, 4, 1);
    let b = AllocationRecord::new(10, 0, 1);
    let table = load(&index_bytes(&[Some(a), None, Some(b)]));

    let live: Vec<_> = table.live_records().collect();

    assert_eq!(live, vec![(0, a), (2, b)]);
}

#[test]
fn test_live_records_skips_unbound_stale_slot() {
    let mut table = DirectoryTable::new();
    let old = table.allocate_slot(AllocationRecord::new(7, 0, 1));
    table.bind(7, old);
    let new = table.allocate_slot(AllocationRecord::new(7, 1, 1));
    table.bind(7, new);

    let live: Vec<_> = table.live_records().map(|(slot, _)| slot).collect();

    assert_eq!(live, vec![new]);
}

#[test]
fn test_get_hides_unbound_stale_slot() {
    let mut table = DirectoryTable::new();
    let old = table.allocate_slot(AllocationRecord::new(7, 0, 1));
    table.bind(7, old);
    let new = table.allocate_slot(AllocationRecord::new(7, 1, 1));
    table.bind(7, new);

    assert_eq!(table.get(old), None);
    assert_eq!(table.get(new), Some(AllocationRecord::new(7, 1, 1)));
    // Still occupied, not reusable
    assert_eq!(table.free_slot_count(), 0);
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn test_release_appended_slot_shrinks_back() {
    let mut table = load(&index_bytes(&[Some(AllocationRecord::new(1, 0, 1))]));
    let before = table.len();

    let slot = table.allocate_slot(AllocationRecord::new(2, 1, 1));
    table.release_slot(slot, before);

    assert_eq!(table.len(), 1);
    assert!(!table.has_holes());
    assert_eq!(table.allocate_slot(AllocationRecord::new(3, 1, 1)), 1);
}

#[test]
fn test_release_reused_slot_returns_it_to_free_set() {
    let mut table = load(&index_bytes(&[None, Some(AllocationRecord::new(1, 0, 1))]));
    let before = table.len();

    let slot = table.allocate_slot(AllocationRecord::new(2, 1, 1));
    assert_eq!(slot, 0);
    table.release_slot(slot, before);

    assert_eq!(table.len(), 2);
    assert_eq!(table.free_slot_count(), 1);
    assert_eq!(table.get(0), None);
    assert_eq!(table.allocate_slot(AllocationRecord::new(3, 2, 1)), 0);
}
