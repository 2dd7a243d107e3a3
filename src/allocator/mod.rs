//! Block Allocator Module
//!
//! Tracks which blocks of the data file are occupied by live payloads.
//!
//! ## Responsibilities
//! - Find the lowest free run of contiguous blocks (first-fit)
//! - Mark and clear block ranges as payloads come and go
//! - Report extent and usage for stats and compaction
//!
//! ## Layout
//! ```text
//! data file:  | blk 0 | blk 1 | blk 2 | blk 3 | blk 4 | ...
//! bitmap:        1       1       0       0       1
//!                └─ id A ─┘      └ free ┘     └ id B
//! ```
//!
//! The bitmap is never persisted. It is derived from the directory at open
//! time: every live allocation record contributes the range
//! `[position, position + blocks_for(length))`.

mod bitmap;

pub use bitmap::BlockAllocator;

/// Size of one addressable block in the data file
pub const BLOCK_SIZE: u32 = 512;

/// Number of blocks a payload of `length` bytes occupies
///
/// Zero-length payloads still own one block so every record has a
/// distinct position.
pub fn blocks_for(length: u32) -> u32 {
    length.div_ceil(BLOCK_SIZE).max(1)
}
