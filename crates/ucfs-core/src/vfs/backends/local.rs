//! Local filesystem backend.
//!
//! Maps canonical paths onto a directory of the host filesystem, with path
//! security to prevent escaping that directory.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::BackingDriver;
use crate::vfs::types::{FileAttr, FileHandle, FileType, OpenFlags};

/// A file opened through this backend.
#[derive(Debug)]
struct LocalFile {
    file: fs::File,
    flags: OpenFlags,
}

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/srv/ucfs`, then `stat("/mnt/sacred/61/x")` looks at
/// `/srv/ucfs/mnt/sacred/61/x`. With a root of `/` canonical paths are used
/// as-is.
///
/// Path security is enforced: attempts to escape via `..` are blocked.
#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
    handles: Mutex<HashMap<FileHandle, Arc<tokio::sync::Mutex<LocalFile>>>>,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            read_only: false,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a canonical path to a host path within the root.
    ///
    /// Returns an error if the path escapes the root (via `..` or symlinks).
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        // Strip leading slash if present
        let path = path.strip_prefix("/").unwrap_or(path);

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(VfsError::path_escapes_root(path.display().to_string()));
        }

        // Handle empty path (root)
        if path.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let full = self.root.join(path);

        // Canonicalize to resolve symlinks. For new files, canonicalize the
        // parent and append the filename.
        let canonical = if full.exists() {
            full.canonicalize().map_err(VfsError::from)?
        } else {
            let parent = full.parent().ok_or_else(|| VfsError::invalid_path("no parent"))?;
            let filename = full
                .file_name()
                .ok_or_else(|| VfsError::invalid_path("no filename"))?;

            if parent.exists() {
                parent.canonicalize().map_err(VfsError::from)?.join(filename)
            } else {
                // Parent doesn't exist yet; no symlinks to follow
                full
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }

        Ok(canonical)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn handle(&self, handle: FileHandle) -> VfsResult<Arc<tokio::sync::Mutex<LocalFile>>> {
        self.handles
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(VfsError::BadHandle(handle))
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }
}

#[async_trait]
impl BackingDriver for LocalBackend {
    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileHandle> {
        if flags.mutates() {
            self.check_writable()?;
        }
        let full_path = self.resolve(path)?;

        if flags.create {
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).await.map_err(VfsError::from)?;
            }
        }

        let file = fs::OpenOptions::new()
            .read(flags.read)
            .write(flags.write && !flags.append)
            .append(flags.append)
            .create(flags.create)
            .truncate(flags.truncate && flags.write)
            .open(&full_path)
            .await
            .map_err(VfsError::from)?;

        let fh = FileHandle::fresh();
        self.handles
            .lock()
            .insert(fh, Arc::new(tokio::sync::Mutex::new(LocalFile { file, flags })));
        Ok(fh)
    }

    async fn read(&self, handle: FileHandle, len: usize) -> VfsResult<Vec<u8>> {
        let open = self.handle(handle)?;
        let mut open = open.lock().await;
        if !open.flags.read {
            return Err(VfsError::permission_denied(handle.to_string()));
        }

        // The buffer grows with what the file yields, never with `len`.
        let limit = u64::try_from(len).unwrap_or(u64::MAX);
        let mut buffer = Vec::new();
        (&mut open.file)
            .take(limit)
            .read_to_end(&mut buffer)
            .await
            .map_err(VfsError::from)?;
        Ok(buffer)
    }

    async fn write(&self, handle: FileHandle, data: &[u8]) -> VfsResult<usize> {
        self.check_writable()?;
        let open = self.handle(handle)?;
        let mut open = open.lock().await;
        if !open.flags.write {
            return Err(VfsError::permission_denied(handle.to_string()));
        }
        open.file.write_all(data).await.map_err(VfsError::from)?;
        open.file.flush().await.map_err(VfsError::from)?;
        Ok(data.len())
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path).await.map_err(VfsError::from)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        use std::os::unix::fs::OpenOptionsExt;

        self.check_writable()?;
        let full_path = self.resolve(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(VfsError::from)?;
        }

        // Create file with specified mode
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&full_path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    VfsError::already_exists(path.display().to_string())
                }
                _ => VfsError::from(e),
            })?;

        let meta = file.metadata().map_err(VfsError::from)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn close(&self, handle: FileHandle) -> VfsResult<()> {
        let open = self
            .handles
            .lock()
            .remove(&handle)
            .ok_or(VfsError::BadHandle(handle))?;
        let mut open = open.lock().await;
        open.file.flush().await.map_err(VfsError::from)
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}
