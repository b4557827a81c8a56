//! Backing store abstraction.
//!
//! This module provides the driver side of the overlay.
//! Key components:
//!
//! - [`BackingDriver`] - Capability set every backing store implements
//! - [`DriverTable`] - Selects the driver serving a backing root
//! - [`MemoryBackend`] - In-memory store (RAMFS stand-in, testing)
//! - [`LocalBackend`] - Host filesystem access (with path security)
//!
//! ## Design Decisions
//!
//! - **Canonical paths in, handles out**: `open`, `stat` and `create` take
//!   full canonical paths; `read` and `write` take the handle `open` returned.
//! - **Per-handle cursor**: Read/write advance the handle's position, so the
//!   overlay forwards each call once with no extra seeks.
//! - **Longest-prefix routing**: DriverTable routes to the most specific
//!   mounted root that matches.

pub mod backends;
mod error;
mod ops;
mod table;
mod types;

pub use backends::{LocalBackend, MemoryBackend};
pub use error::{VfsError, VfsResult};
pub use ops::BackingDriver;
pub use table::{DriverTable, MountInfo};
pub use types::{FileAttr, FileHandle, FileType, OpenFlags};
