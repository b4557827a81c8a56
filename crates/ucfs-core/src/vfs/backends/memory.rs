//! In-memory filesystem backend.
//!
//! Stands in for RAMFS and backs most tests. All data is ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::BackingDriver;
use crate::vfs::types::{FileAttr, FileHandle, OpenFlags};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }
}

/// An open handle: which file, where the cursor is, what it may do.
#[derive(Debug, Clone)]
struct OpenFile {
    path: PathBuf,
    pos: usize,
    flags: OpenFlags,
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal locks. Lock order is handles, then entries.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    handles: Mutex<HashMap<FileHandle, OpenFile>>,
    read_only: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::from(""),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: RwLock::new(entries),
            handles: Mutex::new(HashMap::new()),
            read_only: false,
        }
    }

    /// Create an in-memory filesystem that rejects writes.
    pub fn new_read_only() -> Self {
        Self {
            read_only: true,
            ..Self::new()
        }
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Normalize a path: drop the leading `/` and `.` segments.
    ///
    /// `..` is refused rather than resolved, so one delimiter's namespace
    /// can never reach into another's.
    fn normalize(path: &Path) -> VfsResult<PathBuf> {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                std::path::Component::Normal(s) => result.push(s),
                std::path::Component::ParentDir => {
                    return Err(VfsError::path_escapes_root(Self::path_str(path)));
                }
                std::path::Component::RootDir
                | std::path::Component::CurDir
                | std::path::Component::Prefix(_) => {}
            }
        }
        Ok(result)
    }

    /// Create all missing parent directories of `path`.
    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let std::path::Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory { .. }) => {}
                    Some(Entry::File { .. }) => {
                        return Err(VfsError::not_a_directory(Self::path_str(&current)));
                    }
                    None => {
                        entries.insert(
                            current.clone(),
                            Entry::Directory {
                                attr: FileAttr::directory(0o755),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Insert an empty file. Caller holds the write lock.
    fn insert_file(
        entries: &mut HashMap<PathBuf, Entry>,
        path: &Path,
        mode: u32,
    ) -> VfsResult<FileAttr> {
        if entries.contains_key(path) {
            return Err(VfsError::already_exists(Self::path_str(path)));
        }
        Self::ensure_parents(entries, path)?;
        let attr = FileAttr::file(0, mode);
        entries.insert(
            path.to_path_buf(),
            Entry::File {
                data: Vec::new(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Get the path string for error messages.
    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }
}

#[async_trait]
impl BackingDriver for MemoryBackend {
    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileHandle> {
        if flags.mutates() {
            self.check_writable()?;
        }
        let normalized = Self::normalize(path)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))?;

        if !entries.contains_key(&normalized) {
            if !flags.create {
                return Err(VfsError::not_found(Self::path_str(&normalized)));
            }
            Self::insert_file(&mut entries, &normalized, 0o644)?;
        }
        match entries.get_mut(&normalized) {
            Some(Entry::File { data, attr }) => {
                if flags.truncate && flags.write {
                    data.clear();
                    attr.size = 0;
                    attr.mtime = SystemTime::now();
                }
            }
            Some(Entry::Directory { .. }) => {
                return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }
        drop(entries);

        let fh = FileHandle::fresh();
        self.handles
            .lock()
            .map_err(|_| VfsError::other("lock poisoned"))?
            .insert(
                fh,
                OpenFile {
                    path: normalized,
                    pos: 0,
                    flags,
                },
            );
        Ok(fh)
    }

    async fn read(&self, handle: FileHandle, len: usize) -> VfsResult<Vec<u8>> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| VfsError::other("lock poisoned"))?;
        let open = handles.get_mut(&handle).ok_or(VfsError::BadHandle(handle))?;
        if !open.flags.read {
            return Err(VfsError::permission_denied(Self::path_str(&open.path)));
        }

        let entries = self
            .entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))?;
        match entries.get(&open.path) {
            Some(Entry::File { data, .. }) => {
                let start = open.pos.min(data.len());
                let end = start.saturating_add(len).min(data.len());
                open.pos = end;
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&open.path)))
            }
            None => Err(VfsError::not_found(Self::path_str(&open.path))),
        }
    }

    async fn write(&self, handle: FileHandle, buf: &[u8]) -> VfsResult<usize> {
        self.check_writable()?;
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| VfsError::other("lock poisoned"))?;
        let open = handles.get_mut(&handle).ok_or(VfsError::BadHandle(handle))?;
        if !open.flags.write {
            return Err(VfsError::permission_denied(Self::path_str(&open.path)));
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))?;
        match entries.get_mut(&open.path) {
            Some(Entry::File { data, attr }) => {
                if open.flags.append {
                    open.pos = data.len();
                }
                let end = open.pos + buf.len();
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[open.pos..end].copy_from_slice(buf);
                open.pos = end;
                attr.size = data.len() as u64;
                attr.mtime = SystemTime::now();
                Ok(buf.len())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&open.path)))
            }
            None => Err(VfsError::not_found(Self::path_str(&open.path))),
        }
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let entries = self
            .entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))?;

        entries
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let normalized = Self::normalize(path)?;
        if normalized.as_os_str().is_empty() {
            return Err(VfsError::already_exists("/"));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))?;
        Self::insert_file(&mut entries, &normalized, mode)
    }

    async fn close(&self, handle: FileHandle) -> VfsResult<()> {
        self.handles
            .lock()
            .map_err(|_| VfsError::other("lock poisoned"))?
            .remove(&handle)
            .map(|_| ())
            .ok_or(VfsError::BadHandle(handle))
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}
