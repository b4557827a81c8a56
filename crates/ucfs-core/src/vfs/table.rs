//! Backing root → driver table with longest-prefix selection.
//!
//! The registry decides which backing root a delimiter resolves under; this
//! table decides which driver serves that root.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::ops::BackingDriver;

/// Information about a mounted driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The backing root the driver serves (e.g., "/mnt/sacred").
    pub root: String,
    /// Whether the driver is read-only.
    pub read_only: bool,
}

/// Maps backing roots to driver instances.
///
/// Roots are matched by longest path prefix. If `/mnt` and `/mnt/sacred` are
/// both mounted, root `/mnt/sacred/chants` selects the `/mnt/sacred` driver.
/// A fallback driver, if set, serves roots nothing else matches.
pub struct DriverTable {
    mounts: RwLock<BTreeMap<String, Arc<dyn BackingDriver>>>,
    fallback: RwLock<Option<Arc<dyn BackingDriver>>>,
}

impl std::fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverTable")
            .field("roots", &self.mounts.read().keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.read().is_some())
            .finish()
    }
}

impl Default for DriverTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
            fallback: RwLock::new(None),
        }
    }

    /// Serve `root` with `driver`, replacing any driver already there.
    pub fn mount(&self, root: impl AsRef<str>, driver: impl BackingDriver + 'static) {
        self.mount_arc(root, Arc::new(driver));
    }

    /// Mount a driver that is already wrapped in `Arc`.
    pub fn mount_arc(&self, root: impl AsRef<str>, driver: Arc<dyn BackingDriver>) {
        let root = Self::normalize_root(root.as_ref());
        tracing::info!(root = %root, "mounting backing driver");
        self.mounts.write().insert(root, driver);
    }

    /// Serve every root that no mount matches.
    pub fn set_fallback(&self, driver: Arc<dyn BackingDriver>) {
        *self.fallback.write() = Some(driver);
    }

    /// Remove the driver serving exactly `root`.
    ///
    /// Returns `true` if a mount was removed.
    pub fn unmount(&self, root: impl AsRef<str>) -> bool {
        let root = Self::normalize_root(root.as_ref());
        self.mounts.write().remove(&root).is_some()
    }

    /// List all current mounts.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .iter()
            .map(|(root, driver)| MountInfo {
                root: root.clone(),
                read_only: driver.read_only(),
            })
            .collect()
    }

    /// Find the driver for a backing root.
    ///
    /// The returned `Arc` is independent of the table's lock.
    pub fn select(&self, root: &str) -> Option<Arc<dyn BackingDriver>> {
        let root = Self::normalize_root(root);
        let mounts = self.mounts.read();

        let best = mounts
            .iter()
            .filter(|(mount, _)| Self::covers(mount, &root))
            .max_by_key(|(mount, _)| mount.len())
            .map(|(_, driver)| Arc::clone(driver));

        drop(mounts);
        best.or_else(|| self.fallback.read().clone())
    }

    /// Whether `mount` is `root` or one of its ancestors.
    fn covers(mount: &str, root: &str) -> bool {
        mount == "/"
            || root == mount
            || (root.starts_with(mount) && root.as_bytes().get(mount.len()) == Some(&b'/'))
    }

    /// Normalize a root: ensure it starts with `/` and has no trailing slash.
    fn normalize_root(root: &str) -> String {
        let s = root.trim_end_matches('/');
        if s.is_empty() {
            "/".to_string()
        } else if !s.starts_with('/') {
            format!("/{}", s)
        } else {
            s.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;
    use std::path::Path;

    #[tokio::test]
    async fn test_select_exact() {
        let table = DriverTable::new();
        let sacred = Arc::new(MemoryBackend::new());
        table.mount_arc("/mnt/sacred", sacred.clone());

        let driver = table.select("/mnt/sacred").unwrap();
        driver.write_all(Path::new("/mnt/sacred/x"), b"om").await.unwrap();
        assert_eq!(sacred.read_all(Path::new("/mnt/sacred/x")).await.unwrap(), b"om");
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let table = DriverTable::new();
        let outer = Arc::new(MemoryBackend::new());
        let inner = Arc::new(MemoryBackend::new());
        table.mount_arc("/mnt", outer.clone());
        table.mount_arc("/mnt/project", inner.clone());

        let driver = table.select("/mnt/project/sub").unwrap();
        driver.create(Path::new("/mnt/project/sub/f"), 0o644).await.unwrap();
        assert!(inner.exists(Path::new("/mnt/project/sub/f")).await);
        assert!(!outer.exists(Path::new("/mnt/project/sub/f")).await);

        let driver = table.select("/mnt/other").unwrap();
        driver.create(Path::new("/mnt/other/f"), 0o644).await.unwrap();
        assert!(outer.exists(Path::new("/mnt/other/f")).await);
    }

    #[test]
    fn test_prefix_respects_segment_boundaries() {
        let table = DriverTable::new();
        table.mount("/mnt/a", MemoryBackend::new());
        assert!(table.select("/mnt/ab").is_none());
        assert!(table.select("/mnt/a/b").is_some());
    }

    #[test]
    fn test_root_mount_matches_everything() {
        let table = DriverTable::new();
        table.mount("/", MemoryBackend::new());
        assert!(table.select("/anything/at/all").is_some());
    }

    #[test]
    fn test_fallback() {
        let table = DriverTable::new();
        assert!(table.select("/ucfs").is_none());
        table.set_fallback(Arc::new(MemoryBackend::new()));
        assert!(table.select("/ucfs").is_some());
    }

    #[test]
    fn test_unmount() {
        let table = DriverTable::new();
        table.mount("/data/", MemoryBackend::new());
        assert!(table.select("/data").is_some());
        assert!(table.unmount("/data"));
        assert!(!table.unmount("/data"));
        assert!(table.select("/data").is_none());
    }

    #[test]
    fn test_list_mounts() {
        let table = DriverTable::new();
        table.mount("scratch", MemoryBackend::new());
        table.mount("/ro", MemoryBackend::new_read_only());

        let mounts = table.list_mounts();
        assert_eq!(
            mounts,
            vec![
                MountInfo {
                    root: "/ro".into(),
                    read_only: true
                },
                MountInfo {
                    root: "/scratch".into(),
                    read_only: false
                },
            ]
        );
    }
}
