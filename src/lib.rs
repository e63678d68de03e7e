//! oxitrunk - A per-partition concurrent cell index over a private memory arena
//!
//! Cells are variable-length byte records addressed by a 64-bit id. Each partition
//! owns:
//! - **Cell index**: bucket chains, entry slots with per-cell locks, and packed
//!   `(offset, size)` locations published with a single atomic store
//! - **Memory arena**: an inline bump region plus a table of large objects
//!
//! Every lock operation returns a [`CellLease`] on success. The lease owns the
//! cell's exclusive lock and its storage address; dropping it releases the lock.
//!
//! # Quick Start
//!
//! ```rust
//! use oxitrunk::{CellIndex, CellIndexConfig, Status};
//!
//! let index = CellIndex::new(CellIndexConfig::for_capacity(1024)).unwrap();
//!
//! let mut lease = index.lock_for_save(7, 5, 0).unwrap();
//! lease.as_mut_slice().copy_from_slice(b"hello");
//! drop(lease);
//!
//! let lease = index.lock_for_load(7).unwrap();
//! assert_eq!(lease.as_slice(), b"hello");
//! drop(lease);
//!
//! assert_eq!(index.lock_for_add(7, 5, 0).unwrap_err(), Status::DuplicatedCell);
//! ```

#![warn(missing_docs)]

pub mod arena;
pub mod config;
pub mod index;
pub mod status;
mod utility;

// Re-exports for convenience
pub use arena::{ArenaConfig, ArenaStats, CellLocation, CellOffset, MemoryArena};
pub use config::{ConfigError, OxitrunkConfig};
pub use index::{AddOrUse, CellIndex, CellIndexConfig, CellLease, IndexStats};
pub use status::Status;

/// Identifier of a cell
pub type CellId = u64;

/// Type tag of a cell
pub type CellType = u16;

/// Constants used throughout the library
pub mod constants {
    /// Size of a cache line in bytes
    pub const CACHE_LINE_BYTES: usize = 64;
}

/// Size literals in bytes
pub mod size {
    /// 1 KiB in bytes
    pub const KIB: usize = 1024;
    /// 1 MiB in bytes
    pub const MIB: usize = 1024 * KIB;
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::arena::ArenaConfig;
    pub use crate::index::{AddOrUse, CellIndex, CellIndexConfig, CellLease};
    pub use crate::status::Status;
    pub use crate::{CellId, CellType};
}
