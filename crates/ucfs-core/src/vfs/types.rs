//! Types exchanged with backing drivers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

/// What `stat` and `create` report about a canonical path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    pub size: u64,
    pub kind: FileType,
    /// Unix permission bits, e.g. `0o644`.
    pub perm: u32,
    pub mtime: SystemTime,
}

impl FileAttr {
    /// Attributes for a file just written, stamped now.
    pub fn file(size: u64, perm: u32) -> Self {
        Self::stamped(FileType::File, size, perm)
    }

    /// Attributes for a directory, stamped now.
    pub fn directory(perm: u32) -> Self {
        Self::stamped(FileType::Directory, 0, perm)
    }

    fn stamped(kind: FileType, size: u64, perm: u32) -> Self {
        Self {
            size,
            kind,
            perm,
            mtime: SystemTime::now(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }
}

/// Handle to a file opened on one backing driver.
///
/// Only meaningful to the driver that issued it; the overlay routes handle
/// operations back to that driver by the request's raw path. Drivers take
/// numbers from [`FileHandle::fresh`], so a handle that reaches the wrong
/// driver is unknown there instead of naming someone else's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandle(pub u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl FileHandle {
    /// A number no driver in this process has issued yet.
    pub fn fresh() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fh#{}", self.0)
    }
}

/// Access requested by `open`. Every mode can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    /// Writes go to the end of the file regardless of the cursor.
    pub append: bool,
    /// Create the file (and its parents) when missing.
    pub create: bool,
    pub truncate: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::read()
    }
}

impl OpenFlags {
    pub const fn read() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
        }
    }

    /// Overwrite in place from offset 0. The file must exist.
    pub const fn write() -> Self {
        Self {
            write: true,
            ..Self::read()
        }
    }

    pub const fn append() -> Self {
        Self {
            append: true,
            ..Self::write()
        }
    }

    /// Replace the file's contents, creating it if needed.
    pub const fn create_truncate() -> Self {
        Self {
            create: true,
            truncate: true,
            ..Self::write()
        }
    }

    /// Whether the mode can change the store.
    pub fn mutates(&self) -> bool {
        self.write || self.create || self.truncate
    }
}
