//! # AtlasStore
//!
//! An embedded, persistent, block-allocated object store with:
//! - A fixed-record directory (index file) as the single source of truth
//! - First-fit block allocation over a bitmap derived at open time
//! - Tombstoned directory slots reused before the directory grows
//! - Crash-safe compaction with a commit marker
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BlockStore                           │
//! │        (RwLock: one writer, many concurrent loads)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌──────────────┐          ┌─────────────┐
//!   │  Directory   │          │  Allocator  │
//!   │ (id → slot)  │─derives─▶│  (bitmap)   │
//!   └──────┬───────┘          └──────┬──────┘
//!          │                         │
//!          ▼                         ▼
//!   ┌──────────────┐          ┌─────────────┐
//!   │  {name}.idx  │          │ {name}.dat  │
//!   │ 16-byte recs │          │ 512B blocks │
//!   └──────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasstore::{BlockStore, RawFactory, RawObject, StoreConfig};
//!
//! # fn main() -> atlasstore::Result<()> {
//! let config = StoreConfig::builder().data_dir("./data").name("objects").build();
//! let store = BlockStore::open_with(config)?;
//!
//! store.add(&RawObject::new(42, b"hello".to_vec()))?;
//! assert_eq!(store.load(42, &RawFactory)?, Some(b"hello".to_vec()));
//!
//! store.remove(42)?;
//! store.compact()?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod allocator;
pub mod directory;
pub mod object;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::{StoreConfig, SyncMode};
pub use directory::AllocationRecord;
pub use engine::{BlockStore, CompactionStats, StoreStats};
pub use object::{BincodeFactory, Bincoded, Factory, RawFactory, RawObject, Storable};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
