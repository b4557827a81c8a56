//! # ucfs-core
//!
//! Unicode Character File System: paths whose root and separator are one
//! arbitrary Unicode token.
//!
//! ```text
//! [🕉️]music[🕉️]chants[🕉️]108.mp3
//!   → /mnt/sacred/f09f9589efb88f/music/chants/108.mp3
//! ```
//!
//! The first `[token]` declares the delimiter; every later occurrence of the
//! same token separates components. Paths are translated to canonical POSIX
//! form under a backing root chosen per delimiter by the [`Registry`], then
//! forwarded by the [`Overlay`] to whichever [`BackingDriver`] serves that
//! root.

pub mod canonical;
pub mod codec;
pub mod config;
pub mod error;
pub mod normalize;
pub mod overlay;
pub mod registry;
pub mod scanner;
pub mod sidecar;
pub mod vfs;

pub use canonical::{
    CanonicalPath, CanonicalizeError, DEFAULT_BASE, canonical_len, to_canonical, write_canonical,
};
pub use codec::{
    Component, DelimiterToken, ParseError, ParseErrorKind, PathError, UcfsPath, is_ucfs_path, parse,
};
pub use config::{BackingConfig, BackingKind, ConfigError, UcfsConfig};
pub use error::{UcfsError, UcfsResult};
pub use normalize::{Nfc, NormalizeMode, Normalizer, Passthrough};
pub use overlay::{Operation, Outcome, Overlay, Request, RequestState, Resolved};
pub use registry::{Registry, RegistryEntry, RegistryError};
pub use sidecar::metadata_path_for;
pub use vfs::{
    BackingDriver, DriverTable, FileAttr, FileHandle, FileType, MountInfo, OpenFlags, VfsError,
    VfsResult,
    backends::{LocalBackend, MemoryBackend},
};
