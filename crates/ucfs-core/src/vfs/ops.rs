//! Backing driver capability set.
//!
//! Every store the overlay can forward to (RAM, local disk, anything else)
//! implements this one trait. The overlay never names a concrete store.

use async_trait::async_trait;
use std::path::Path;

use super::types::{FileAttr, FileHandle, OpenFlags};
use super::VfsResult;

/// Operations a backing store must provide.
///
/// Paths are canonical host-namespace paths (absolute, `/`-separated).
/// Handles are per-driver: a handle from one driver means nothing to another.
#[async_trait]
pub trait BackingDriver: Send + Sync {
    /// Open an existing file (or create it if `flags.create`).
    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileHandle>;

    /// Read up to `len` bytes at the handle's cursor and advance it.
    ///
    /// Returns fewer bytes at end of file, and an empty vector past it.
    async fn read(&self, handle: FileHandle, len: usize) -> VfsResult<Vec<u8>>;

    /// Write `data` at the handle's cursor (or the end, in append mode) and
    /// advance it. Returns the number of bytes written.
    async fn write(&self, handle: FileHandle, data: &[u8]) -> VfsResult<usize>;

    /// Get file attributes.
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Create an empty file, making missing parent directories.
    ///
    /// Fails with `AlreadyExists` if something is already at `path`.
    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Release a handle.
    async fn close(&self, handle: FileHandle) -> VfsResult<()>;

    /// Returns true if this store rejects writes.
    fn read_only(&self) -> bool;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let attr = self.stat(path).await?;
        let fh = self.open(path, OpenFlags::read()).await?;
        let data = self.read(fh, attr.size as usize).await;
        self.close(fh).await?;
        data
    }

    /// Replace entire file contents, creating the file if needed.
    async fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        if !self.exists(path).await {
            self.create(path, 0o644).await?;
        }
        let fh = self.open(path, OpenFlags::create_truncate()).await?;
        let written = self.write(fh, data).await;
        self.close(fh).await?;
        written.map(|_| ())
    }
}
