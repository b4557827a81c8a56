//! Delimiter registry.
//!
//! Maps each delimiter token to the backing root its paths resolve under.
//! Tokens are compared byte-for-byte. A token with no entry resolves to the
//! registry's default root, so lookups never fail.
//!
//! ## File format
//!
//! One entry per line, `<token> <root>`, split at the first ASCII space. The
//! root is the rest of the line and may itself contain spaces, but never a
//! line break, and is never empty. Blank lines and lines starting with `#`
//! are skipped.
//!
//! A token is written raw when it is valid UTF-8 with no whitespace, control
//! characters or `\`, and does not start with `#` or `hex:`. Anything else is
//! written as `hex:` followed by the lowercase hex of its bytes:
//!
//! ```text
//! # ucfs delimiter registry
//! 🕉️ /mnt/sacred
//! hex:6120620a /mnt/spaced
//! ```
//!
//! ## Locking
//!
//! Lookups and listings take a shared lock just long enough to copy the
//! answer out. Mutations take the exclusive lock only to update the map;
//! writing the file happens under a separate persist lock, so a slow disk
//! never stalls lookups.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::codec::{DelimiterToken, PathError};

/// Prefix marking a hex-escaped token in the registry file.
const HEX_PREFIX: &str = "hex:";

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A line of registry input could not be parsed.
    #[error("registry line {line}: {reason}")]
    Load { line: usize, reason: String },

    /// The registry could not be written out.
    ///
    /// When returned from [`Registry::insert`] or [`Registry::remove`] the
    /// in-memory change has still been applied.
    #[error("failed to persist registry to {target}: {source}")]
    Persist {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The registry file could not be read.
    #[error("failed to read registry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A backing root the registry file could not hold.
    #[error("invalid backing root {root:?}: {reason}")]
    InvalidRoot { root: String, reason: &'static str },

    #[error("invalid delimiter token: {0}")]
    InvalidToken(#[from] PathError),
}

impl RegistryError {
    /// True when the in-memory registry holds state the store does not.
    pub fn is_persist(&self) -> bool {
        matches!(self, RegistryError::Persist { .. })
    }
}

/// One delimiter → backing root mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub token: DelimiterToken,
    pub root: String,
}

/// Delimiter → backing root mapping for one mount.
///
/// Constructed when the overlay is mounted and shared with it by `Arc`;
/// there is no process-wide instance.
#[derive(Debug)]
pub struct Registry {
    default_root: String,
    store: Option<PathBuf>,
    entries: RwLock<IndexMap<DelimiterToken, String>>,
    persist_lock: Mutex<()>,
}

impl Registry {
    /// An in-memory registry. `insert` never touches disk.
    pub fn new(default_root: impl Into<String>) -> Self {
        Self {
            default_root: default_root.into(),
            store: None,
            entries: RwLock::new(IndexMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// A registry that rewrites `store` after every successful mutation.
    /// Does not read `store`; see [`Registry::open`].
    pub fn with_store(default_root: impl Into<String>, store: impl Into<PathBuf>) -> Self {
        Self {
            store: Some(store.into()),
            ..Self::new(default_root)
        }
    }

    /// Like [`Registry::with_store`], loading `store` first if it exists.
    pub fn open(
        default_root: impl Into<String>,
        store: impl Into<PathBuf>,
    ) -> Result<Self, RegistryError> {
        let registry = Self::with_store(default_root, store);
        if let Some(path) = registry.store.as_deref() {
            if path.exists() {
                registry.load_file(path)?;
            } else {
                tracing::debug!(path = %path.display(), "no registry file yet");
            }
        }
        Ok(registry)
    }

    /// Root used for tokens with no entry.
    pub fn default_root(&self) -> &str {
        &self.default_root
    }

    /// File mutations are persisted to, if any.
    pub fn store(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    /// Backing root for `token`, or the default root.
    pub fn lookup(&self, token: &DelimiterToken) -> String {
        self.entries
            .read()
            .get(token)
            .cloned()
            .unwrap_or_else(|| self.default_root.clone())
    }

    /// Backing root for `token` only if it has an explicit entry.
    pub fn get(&self, token: &DelimiterToken) -> Option<String> {
        self.entries.read().get(token).cloned()
    }

    /// Map `token` to `root`, replacing any existing mapping.
    ///
    /// A root that is empty or spans lines is refused with
    /// [`RegistryError::InvalidRoot`] and nothing changes. On
    /// `Err(RegistryError::Persist { .. })` the new mapping is active in this
    /// process but was not saved.
    pub fn insert(
        &self,
        token: DelimiterToken,
        root: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let root = root.into();
        if let Err(reason) = check_root(&root) {
            return Err(RegistryError::InvalidRoot { root, reason });
        }
        let _persist = self.persist_lock.lock();
        let previous = self.entries.write().insert(token.clone(), root.clone());
        tracing::debug!(token = %token, root = %root, ?previous, "registry insert");
        self.persist_after_mutation()
    }

    /// Drop the mapping for `token`. Returns whether one existed.
    ///
    /// Persistence failures are reported the same way as for `insert`.
    pub fn remove(&self, token: &DelimiterToken) -> Result<bool, RegistryError> {
        let _persist = self.persist_lock.lock();
        let removed = self.entries.write().shift_remove(token).is_some();
        if !removed {
            return Ok(false);
        }
        tracing::debug!(token = %token, "registry remove");
        self.persist_after_mutation().map(|()| true)
    }

    /// Snapshot of all entries.
    pub fn list(&self) -> Vec<RegistryEntry> {
        self.entries
            .read()
            .iter()
            .map(|(token, root)| RegistryEntry {
                token: token.clone(),
                root: root.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace every entry with those read from `source`.
    ///
    /// The whole source is parsed before anything changes; on error the
    /// registry keeps its previous contents. Returns the number of entries.
    pub fn load<R: BufRead>(&self, source: R) -> Result<usize, RegistryError> {
        let parsed = parse_entries(source)?;
        let count = parsed.len();
        *self.entries.write() = parsed;
        Ok(count)
    }

    /// Write every entry to `sink` in registry file syntax.
    pub fn save<W: Write>(&self, mut sink: W) -> Result<(), RegistryError> {
        let text = self.render();
        sink.write_all(text.as_bytes())
            .and_then(|()| sink.flush())
            .map_err(|source| RegistryError::Persist {
                target: "sink".to_string(),
                source,
            })
    }

    /// Load from a file path.
    pub fn load_file(&self, path: &Path) -> Result<usize, RegistryError> {
        let file = fs::File::open(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let count = self.load(io::BufReader::new(file))?;
        tracing::info!(path = %path.display(), entries = count, "loaded delimiter registry");
        Ok(count)
    }

    /// Save to a file path, replacing it atomically.
    pub fn save_file(&self, path: &Path) -> Result<(), RegistryError> {
        let _persist = self.persist_lock.lock();
        self.write_file(path)
    }

    fn persist_after_mutation(&self) -> Result<(), RegistryError> {
        let Some(path) = self.store.as_deref() else {
            return Ok(());
        };
        self.write_file(path).inspect_err(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "registry change applied in memory but not persisted"
            );
        })
    }

    /// Write-then-rename. Caller holds `persist_lock`.
    fn write_file(&self, path: &Path) -> Result<(), RegistryError> {
        let persist_err = |source| RegistryError::Persist {
            target: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, self.render()).map_err(persist_err)?;
        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(persist_err(source));
        }
        tracing::info!(path = %path.display(), entries = self.len(), "saved delimiter registry");
        Ok(())
    }

    fn render(&self) -> String {
        let entries = self.entries.read();
        let mut out = String::from("# ucfs delimiter registry\n");
        for (token, root) in entries.iter() {
            out.push_str(&encode_token(token));
            out.push(' ');
            out.push_str(root);
            out.push('\n');
        }
        out
    }
}

/// Registry-file spelling of a token.
pub fn encode_token(token: &DelimiterToken) -> String {
    match std::str::from_utf8(token.as_bytes()) {
        Ok(text) if is_plain(text) => text.to_string(),
        _ => format!("{HEX_PREFIX}{}", token.to_hex()),
    }
}

/// Parse a token as written by [`encode_token`].
pub fn decode_token(text: &str) -> Result<DelimiterToken, String> {
    let bytes = match text.strip_prefix(HEX_PREFIX) {
        Some(hex_part) => hex::decode(hex_part).map_err(|e| format!("bad hex token: {e}"))?,
        None => text.as_bytes().to_vec(),
    };
    DelimiterToken::new(bytes).map_err(|e| e.to_string())
}

/// Why `root` cannot be stored, if it cannot.
fn check_root(root: &str) -> Result<(), &'static str> {
    if root.is_empty() {
        Err("empty backing root")
    } else if root.contains(['\n', '\r']) {
        Err("backing root contains a line break")
    } else {
        Ok(())
    }
}

fn is_plain(text: &str) -> bool {
    !text.starts_with('#')
        && !text.starts_with(HEX_PREFIX)
        && !text
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '\\')
}

fn parse_entries<R: BufRead>(source: R) -> Result<IndexMap<DelimiterToken, String>, RegistryError> {
    let mut entries = IndexMap::new();
    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| RegistryError::Load {
            line: line_no,
            reason: e.to_string(),
        })?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let load_err = |reason: String| RegistryError::Load {
            line: line_no,
            reason,
        };
        let (token, root) = line
            .split_once(' ')
            .ok_or_else(|| load_err("expected '<token> <root>'".to_string()))?;
        check_root(root).map_err(|reason| load_err(reason.to_string()))?;
        let token = decode_token(token).map_err(load_err)?;
        entries.insert(token, root.to_string());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tok(s: &str) -> DelimiterToken {
        DelimiterToken::try_from(s).unwrap()
    }

    #[test]
    fn test_lookup_default() {
        let registry = Registry::new("/ucfs");
        assert_eq!(registry.lookup(&tok("a")), "/ucfs");
        assert_eq!(registry.get(&tok("a")), None);
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("🕉️"), "/mnt/sacred").unwrap();
        assert_eq!(registry.lookup(&tok("🕉️")), "/mnt/sacred");
        // the bare symbol without the variation selector is a different token
        assert_eq!(registry.lookup(&tok("🕉")), "/ucfs");
    }

    #[test]
    fn test_insert_overwrites() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("a"), "/one").unwrap();
        registry.insert(tok("a"), "/two").unwrap();
        assert_eq!(registry.lookup(&tok("a")), "/two");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_isolated_from_other_tokens() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("b"), "/b").unwrap();
        let before: Vec<_> = ["a", "b", "c", "🌍"]
            .iter()
            .map(|t| registry.lookup(&tok(t)))
            .collect();
        registry.insert(tok("a"), "/elsewhere").unwrap();
        for (t, old) in ["b", "c", "🌍"].iter().zip(before.iter().skip(1)) {
            assert_eq!(&registry.lookup(&tok(t)), old);
        }
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("a"), "/a").unwrap();
        assert!(registry.remove(&tok("a")).unwrap());
        assert!(!registry.remove(&tok("a")).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_in_insertion_order() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("z"), "/z").unwrap();
        registry.insert(tok("a"), "/a").unwrap();
        let tokens: Vec<_> = registry.list().into_iter().map(|e| e.token).collect();
        assert_eq!(tokens, vec![tok("z"), tok("a")]);
    }

    #[test]
    fn test_token_encoding() {
        assert_eq!(encode_token(&tok("🕉️")), "🕉️");
        assert_eq!(encode_token(&tok("a b")), "hex:612062");
        assert_eq!(encode_token(&tok("#x")), "hex:2378");
        assert_eq!(encode_token(&tok("hex:61")), "hex:6865783a3631");
        assert_eq!(encode_token(&tok("a\\b")), "hex:615c62");
        assert_eq!(
            encode_token(&DelimiterToken::new(vec![0xFF]).unwrap()),
            "hex:ff"
        );
    }

    #[test]
    fn test_token_decoding() {
        for t in ["a", "🕉️", "a b", "tab\there", "#", "hex:61", "\u{2003}"] {
            assert_eq!(decode_token(&encode_token(&tok(t))).unwrap(), tok(t), "{t:?}");
        }
        assert!(decode_token("hex:zz").is_err());
        assert!(decode_token("hex:").is_err());
        assert!(decode_token("a]").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("🕉️"), "/mnt/sacred").unwrap();
        registry.insert(tok("a b"), "/mnt/with space").unwrap();

        let mut buf = Vec::new();
        registry.save(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("🕉️ /mnt/sacred\n"));
        assert!(text.contains("hex:612062 /mnt/with space\n"));

        let reloaded = Registry::new("/ucfs");
        assert_eq!(reloaded.load(buf.as_slice()).unwrap(), 2);
        assert_eq!(reloaded.list(), registry.list());
    }

    #[test]
    fn test_load_skips_comments_and_blanks() {
        let registry = Registry::new("/ucfs");
        let input = "# header\n\n   \na /a\n# trailing\n";
        assert_eq!(registry.load(input.as_bytes()).unwrap(), 1);
        assert_eq!(registry.lookup(&tok("a")), "/a");
    }

    #[test]
    fn test_load_error_keeps_state() {
        let registry = Registry::new("/ucfs");
        registry.insert(tok("keep"), "/kept").unwrap();

        let err = registry.load("a /a\nmissing-root\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::Load { line: 2, .. }));
        assert_eq!(registry.lookup(&tok("keep")), "/kept");
        assert_eq!(registry.lookup(&tok("a")), "/ucfs");
    }

    #[test]
    fn test_load_rejects_bad_token() {
        let registry = Registry::new("/ucfs");
        let err = registry.load("x] /a\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::Load { line: 1, .. }));
        let err = registry.load("a \n".as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::Load { line: 1, .. }));
    }

    #[test]
    fn test_insert_persists_to_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/registry");
        let registry = Registry::with_store("/ucfs", &path);
        registry.insert(tok("a"), "/a").unwrap();

        let reopened = Registry::open("/ucfs", &path).unwrap();
        assert_eq!(reopened.lookup(&tok("a")), "/a");
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::open("/ucfs", dir.path().join("registry")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_persist_failure_keeps_mapping() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should go makes the rename fail.
        let path = dir.path().join("registry");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupant"), b"x").unwrap();

        let registry = Registry::with_store("/ucfs", &path);
        let err = registry.insert(tok("a"), "/a").unwrap_err();
        assert!(err.is_persist());
        assert_eq!(registry.lookup(&tok("a")), "/a");
        assert!(!dir.path().join("registry.tmp").exists());
    }

    #[test]
    fn test_insert_rejects_empty_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry");
        let registry = Registry::with_store("/ucfs", &path);
        registry.insert(tok("b"), "/b").unwrap();

        let err = registry.insert(tok("a"), "").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRoot { .. }));
        assert!(!err.is_persist());
        assert_eq!(registry.get(&tok("a")), None);

        let reopened = Registry::open("/ucfs", &path).unwrap();
        assert_eq!(reopened.list(), registry.list());
    }

    #[test]
    fn test_insert_rejects_multiline_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry");
        let registry = Registry::with_store("/ucfs", &path);
        registry.insert(tok("a"), "/a").unwrap();

        for root in ["/x\nb /evil", "/x\r", "\n"] {
            let err = registry.insert(tok("a"), root).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidRoot { .. }), "{root:?}");
        }
        assert_eq!(registry.lookup(&tok("a")), "/a");

        let reopened = Registry::open("/ucfs", &path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.lookup(&tok("a")), "/a");
        assert_eq!(reopened.lookup(&tok("b")), "/ucfs");
    }

    #[test]
    fn test_concurrent_lookups_and_inserts() {
        let registry = Arc::new(Registry::new("/ucfs"));
        registry.insert(tok("fixed"), "/fixed").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for n in 0..200 {
                        let t = tok(&format!("t{i}-{n}"));
                        registry.insert(t.clone(), format!("/r{i}/{n}")).unwrap();
                        assert_eq!(registry.lookup(&t), format!("/r{i}/{n}"));
                        assert_eq!(registry.lookup(&tok("fixed")), "/fixed");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 1 + 8 * 200);
    }
}
