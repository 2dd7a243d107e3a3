//! Tests for the allocation record codec
//!
//! These tests verify:
//! - The exact 16-byte big-endian layout
//! - Decoding live records and tombstones
//! - The liveness flag that keeps id 0 distinct from a tombstone
//! - Block extent helpers

use atlasstore::allocator::{blocks_for, BLOCK_SIZE};
use atlasstore::directory::{
    decode, encode, is_empty, AllocationRecord, EMPTY_RECORD, LIVE_FLAG, MAX_PAYLOAD_LEN,
    RECORD_SIZE,
};
use atlasstore::StoreError;

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_record_size_is_sixteen_bytes() {
    assert_eq!(RECORD_SIZE, 16);
    assert_eq!(EMPTY_RECORD.len(), RECORD_SIZE);
}

#[test]
fn test_encode_layout_big_endian() {
    let record = AllocationRecord::new(0x0102_0304_0506_0708, 0x0A0B_0C0D, 0x0000_0203);
    let bytes = encode(&record);

    assert_eq!(&bytes[0..8], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    assert_eq!(&bytes[8..12], &[0x0A, 0x0B, 0x0C, 0x0D]);
    // Length word carries the liveness flag in its top bit
    assert_eq!(&bytes[12..16], &[0x80, 0x00, 0x02, 0x03]);
}

#[test]
fn test_encode_decode_inverse() {
    let records = [
        AllocationRecord::new(0x1234_5678, 0, 10),
        AllocationRecord::new(u64::MAX, u32::MAX, MAX_PAYLOAD_LEN),
        AllocationRecord::new(7, 3, 0),
    ];

    for record in records {
        let decoded = decode(&encode(&record)).unwrap();
        assert_eq!(decoded, Some(record));
    }
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_empty_record_decodes_to_none() {
    assert!(is_empty(&EMPTY_RECORD));
    assert_eq!(decode(&EMPTY_RECORD).unwrap(), None);
}

#[test]
fn test_zero_id_record_is_not_a_tombstone() {
    let record = AllocationRecord::new(0, 0, 0);
    let bytes = encode(&record);

    assert!(!is_empty(&bytes));
    assert_eq!(decode(&bytes).unwrap(), Some(record));
}

#[test]
fn test_missing_live_flag_is_corruption() {
    let mut bytes = encode(&AllocationRecord::new(99, 1, 1));
    bytes[12] &= !((LIVE_FLAG >> 24) as u8);

    let result = decode(&bytes);
    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

#[test]
fn test_single_nonzero_byte_is_not_empty() {
    let mut bytes = EMPTY_RECORD;
    bytes[15] = 1;

    assert!(!is_empty(&bytes));
}

// =============================================================================
// Extent Tests
// =============================================================================

#[test]
fn test_blocks_for_rounds_up_with_minimum_one() {
    assert_eq!(BLOCK_SIZE, 512);
    assert_eq!(blocks_for(0), 1);
    assert_eq!(blocks_for(1), 1);
    assert_eq!(blocks_for(512), 1);
    assert_eq!(blocks_for(513), 2);
    assert_eq!(blocks_for(1024), 2);
    assert_eq!(blocks_for(1025), 3);
}

#[test]
fn test_record_extent_helpers() {
    let record = AllocationRecord::new(1, 4, 1000);

    assert_eq!(record.blocks_needed(), 2);
    assert_eq!(record.end_block(), 6);
    assert_eq!(record.byte_offset(), 4 * 512);
}

#[test]
fn test_end_block_does_not_overflow_u32() {
    let record = AllocationRecord::new(1, u32::MAX, 600);

    assert_eq!(record.end_block(), u64::from(u32::MAX) + 2);
}
