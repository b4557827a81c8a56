//! Canonical path mapping.
//!
//! A parsed [`UcfsPath`] maps onto the host namespace as
//!
//! ```text
//! <base>/<hex of delimiter bytes>/<component0>/.../<componentN>
//! ```
//!
//! where `<base>` defaults to [`DEFAULT_BASE`] and is otherwise the backing
//! root chosen by the registry. Components are copied verbatim. The mapping
//! is a pure function of `(path, base)`.

use std::fmt;

use thiserror::Error;

use crate::codec::UcfsPath;

/// Namespace used when no backing root is supplied.
pub const DEFAULT_BASE: &str = "/ucfs";

/// Canonicalization into a fixed-capacity buffer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CanonicalizeError {
    #[error("canonical path needs {needed} bytes, buffer holds {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
}

/// A canonical path in the host namespace.
///
/// Remembers where the base ends so the base and the per-delimiter part can
/// be recovered without re-parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath {
    text: String,
    base_len: usize,
}

impl CanonicalPath {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// The base the path was built under, without a trailing `/`.
    /// Empty when the base was `/`.
    pub fn base(&self) -> &str {
        &self.text[..self.base_len]
    }

    /// Everything after the base: `/<hex>/<components...>`.
    pub fn relative(&self) -> &str {
        &self.text[self.base_len..]
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl AsRef<std::path::Path> for CanonicalPath {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.text)
    }
}

/// Strip trailing slashes; `None` selects the default base.
fn effective_base(base: Option<&str>) -> &str {
    base.unwrap_or(DEFAULT_BASE).trim_end_matches('/')
}

/// Exact byte length of the canonical form of `(path, base)`.
pub fn canonical_len(path: &UcfsPath, base: Option<&str>) -> usize {
    let base = effective_base(base);
    let hex = path.delimiter().as_bytes().len() * 2;
    let comps: usize = path.components().iter().map(|c| 1 + c.as_bytes().len()).sum();
    base.len() + 1 + hex + comps
}

/// Build the canonical path for `path` under `base` (default `/ucfs`).
pub fn to_canonical(path: &UcfsPath, base: Option<&str>) -> CanonicalPath {
    let base = effective_base(base);
    let mut text = String::with_capacity(canonical_len(path, Some(base)));
    text.push_str(base);
    text.push('/');
    text.push_str(&path.delimiter().to_hex());
    for c in path.components() {
        text.push('/');
        text.push_str(c.as_str());
    }
    CanonicalPath {
        text,
        base_len: base.len(),
    }
}

/// Write the canonical path into `out`, returning the number of bytes used.
///
/// When `out` is too small nothing is written.
pub fn write_canonical(
    path: &UcfsPath,
    base: Option<&str>,
    out: &mut [u8],
) -> Result<usize, CanonicalizeError> {
    let needed = canonical_len(path, base);
    if needed > out.len() {
        return Err(CanonicalizeError::BufferTooSmall {
            needed,
            capacity: out.len(),
        });
    }

    let base = effective_base(base);
    let mut pos = 0;
    let mut put = |bytes: &[u8]| {
        out[pos..pos + bytes.len()].copy_from_slice(bytes);
        pos += bytes.len();
    };
    put(base.as_bytes());
    put(b"/");
    put(path.delimiter().to_hex().as_bytes());
    for c in path.components() {
        put(b"/");
        put(c.as_bytes());
    }
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse;

    fn p(raw: &str) -> UcfsPath {
        parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_default_base() {
        let c = to_canonical(&p("[a]Home[a]Docs[a]resume.txt"), None);
        assert_eq!(c.as_str(), "/ucfs/61/Home/Docs/resume.txt");
        assert_eq!(c.base(), "/ucfs");
        assert_eq!(c.relative(), "/61/Home/Docs/resume.txt");
    }

    #[test]
    fn test_backing_root_base() {
        let c = to_canonical(&p("[🕉️]music[🕉️]chants[🕉️]108.mp3"), Some("/mnt/sacred"));
        assert_eq!(
            c.as_str(),
            "/mnt/sacred/f09f9589efb88f/music/chants/108.mp3"
        );
    }

    #[test]
    fn test_trailing_slash_base() {
        let path = p("[a]x");
        assert_eq!(to_canonical(&path, Some("/mnt/data/")).as_str(), "/mnt/data/61/x");
        assert_eq!(to_canonical(&path, Some("/")).as_str(), "/61/x");
        assert_eq!(to_canonical(&path, Some("/")).base(), "");
    }

    #[test]
    fn test_components_verbatim() {
        let c = to_canonical(&p("[🌍]🏠[🌍]👤[🌍]documents[🌍]resume.pdf"), None);
        assert_eq!(c.as_str(), "/ucfs/f09f8c8d/🏠/👤/documents/resume.pdf");
    }

    #[test]
    fn test_lookalike_tokens_do_not_collide() {
        let with_vs = to_canonical(&p("[🕉️]x"), None);
        let without_vs = to_canonical(&p("[🕉]x"), None);
        assert_ne!(with_vs, without_vs);
    }

    #[test]
    fn test_deterministic() {
        let path = p("[::]a[::]b");
        let first = to_canonical(&path, Some("/srv"));
        let second = to_canonical(&path.clone(), Some("/srv"));
        assert_eq!(first.as_str().as_bytes(), second.as_str().as_bytes());
    }

    #[test]
    fn test_len_matches() {
        for (raw, base) in [
            ("[a]Home[a]Docs", None),
            ("[🌍]🏠[🌍]x", Some("/mnt/a/")),
            ("[ॐ]a", Some("/")),
        ] {
            let path = p(raw);
            assert_eq!(canonical_len(&path, base), to_canonical(&path, base).as_str().len());
        }
    }

    #[test]
    fn test_write_into_buffer() {
        let path = p("[a]Home[a]Docs[a]resume.txt");
        let mut buf = [0u8; 64];
        let n = write_canonical(&path, None, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"/ucfs/61/Home/Docs/resume.txt");
    }

    #[test]
    fn test_exact_fit() {
        let path = p("[a]x");
        let mut buf = [0u8; 10];
        assert_eq!(write_canonical(&path, None, &mut buf), Ok(10));
        assert_eq!(&buf, b"/ucfs/61/x");
    }

    #[test]
    fn test_buffer_too_small_writes_nothing() {
        let path = p("[a]Home[a]Docs[a]resume.txt");
        let mut buf = [0xAAu8; 8];
        let err = write_canonical(&path, None, &mut buf).unwrap_err();
        assert_eq!(
            err,
            CanonicalizeError::BufferTooSmall {
                needed: 29,
                capacity: 8
            }
        );
        assert!(buf.iter().all(|b| *b == 0xAA));
    }
}
