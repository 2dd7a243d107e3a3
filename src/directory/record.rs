//! Allocation record codec
//!
//! Fixed 16-byte encoding of one directory slot.

use bytes::{Buf, BufMut};

use crate::allocator::{blocks_for, BLOCK_SIZE};
use crate::error::{Result, StoreError};

/// Size of one encoded record: Id (8) + Block (4) + Flag|Length (4)
pub const RECORD_SIZE: usize = 16;

/// Liveness bit carried in the length word of every live record
pub const LIVE_FLAG: u32 = 0x8000_0000;

/// Largest payload a record can describe
pub const MAX_PAYLOAD_LEN: u32 = LIVE_FLAG - 1;

/// Tombstone: the encoding of an empty slot
pub const EMPTY_RECORD: [u8; RECORD_SIZE] = [0u8; RECORD_SIZE];

/// Where one object's payload lives in the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationRecord {
    /// Caller-assigned object identity
    pub id: u64,
    /// Index of the first block
    pub position: u32,
    /// Exact payload length in bytes
    pub length: u32,
}

impl AllocationRecord {
    pub fn new(id: u64, position: u32, length: u32) -> Self {
        Self {
            id,
            position,
            length,
        }
    }

    /// Blocks occupied by the payload (at least one)
    pub fn blocks_needed(&self) -> u32 {
        blocks_for(self.length)
    }

    /// One past the last occupied block
    pub fn end_block(&self) -> u64 {
        u64::from(self.position) + u64::from(self.blocks_needed())
    }

    /// Byte offset of the payload in the data file
    pub fn byte_offset(&self) -> u64 {
        u64::from(self.position) * u64::from(BLOCK_SIZE)
    }
}

/// Encode a record: `id | position | length | LIVE_FLAG`, big-endian
///
/// `record.length` must not exceed [`MAX_PAYLOAD_LEN`].
pub fn encode(record: &AllocationRecord) -> [u8; RECORD_SIZE] {
    debug_assert!(record.length <= MAX_PAYLOAD_LEN);

    let mut out = [0u8; RECORD_SIZE];
    let mut buf = &mut out[..];
    buf.put_u64(record.id);
    buf.put_u32(record.position);
    buf.put_u32(record.length | LIVE_FLAG);
    out
}

/// Decode a record
///
/// Returns:
/// - `Ok(Some(record))`: a live record
/// - `Ok(None)`: a tombstone (all bytes zero)
/// - `Err(Corruption)`: non-zero bytes without the liveness flag
pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Result<Option<AllocationRecord>> {
    if is_empty(bytes) {
        return Ok(None);
    }

    let mut buf = &bytes[..];
    let id = buf.get_u64();
    let position = buf.get_u32();
    let raw_length = buf.get_u32();

    if raw_length & LIVE_FLAG == 0 {
        return Err(StoreError::Corruption(format!(
            "record for id {:#x} is missing its liveness flag",
            id
        )));
    }

    Ok(Some(AllocationRecord::new(
        id,
        position,
        raw_length & !LIVE_FLAG,
    )))
}

/// True iff every byte of the record is zero
pub fn is_empty(bytes: &[u8; RECORD_SIZE]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
