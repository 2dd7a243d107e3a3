//! Directory Module
//!
//! The index file: a flat array of fixed-size allocation records, one per
//! directory slot, plus the in-memory table rebuilt from it at open time.
//!
//! ## Responsibilities
//! - Encode/decode 16-byte allocation records
//! - Track live and empty (tombstoned) slots
//! - Map object ids to the slot holding their record
//! - Reuse the lowest empty slot before growing
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Slot 0 (16 bytes)                                    │
//! │ ┌──────────────┬──────────────┬────────────────────┐ │
//! │ │ Id: u64 (8)  │ Block: u32(4)│ Flag|Length: u32(4)│ │
//! │ └──────────────┴──────────────┴────────────────────┘ │
//! ├──────────────────────────────────────────────────────┤
//! │ Slot 1 (16 bytes)                                    │
//! │   ... repeated, slot i at byte offset i * 16 ...     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! All fields are big-endian. The top bit of the length word is set on
//! every live record; an all-zero slot is a tombstone.

mod record;
mod table;

pub use record::{
    decode, encode, is_empty, AllocationRecord, EMPTY_RECORD, LIVE_FLAG, MAX_PAYLOAD_LEN,
    RECORD_SIZE,
};
pub use table::{DirectoryLoad, DirectoryTable};
