//! Subcommand bodies. Output goes to the writer they are handed so tests can
//! capture it.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use ucfs_core::registry::{decode_token, encode_token};
use ucfs_core::{
    DelimiterToken, OpenFlags, Overlay, RegistryError, UcfsError, metadata_path_for,
};

/// Bytes requested per read while streaming a file out.
const CHUNK: usize = 64 * 1024;

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Nothing matched (e.g. unmapping an unknown token).
    Missing,
    /// The registry changed in memory but the file was not written.
    NotSaved,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => ExitCode::SUCCESS,
            Status::Missing => ExitCode::FAILURE,
            Status::NotSaved => ExitCode::from(2),
        }
    }
}

/// The line printed for a failed command.
///
/// Parse errors use the compact `error: <kind> at byte <offset>` form.
pub fn error_line(err: &anyhow::Error) -> String {
    match err.downcast_ref::<UcfsError>() {
        Some(UcfsError::Parse(parse)) => format!("error: {parse}"),
        _ => format!("error: {err:#}"),
    }
}

pub fn encode(overlay: &Overlay, raw: &[u8], as_json: bool, out: &mut impl Write) -> Result<()> {
    let resolved = overlay.resolve(raw)?;
    let delimiter = resolved.path.delimiter();
    let components: Vec<&str> = resolved.path.components().iter().map(|c| c.as_str()).collect();

    if as_json {
        let value = json!({
            "delimiter": delimiter.to_string(),
            "delimiter_hex": delimiter.to_hex(),
            "components": components,
            "canonical_path": resolved.canonical.as_str(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        writeln!(out, "delimiter: {} (hex {})", delimiter, delimiter.to_hex())?;
        writeln!(out, "components: {components:?}")?;
        writeln!(out, "canonical: {}", resolved.canonical)?;
        writeln!(out, "sidecar: {}", metadata_path_for(&resolved.canonical))?;
    }
    Ok(())
}

/// Decode a token from the command line into the form paths resolve with.
fn registry_token(overlay: &Overlay, token: &str) -> Result<DelimiterToken> {
    let token = decode_token(token).map_err(|reason| anyhow!("invalid token: {reason}"))?;
    Ok(overlay.normalize_token(token))
}

pub fn map(overlay: &Overlay, token: &str, root: &str, err: &mut impl Write) -> Result<Status> {
    let token = registry_token(overlay, token)?;
    settle(overlay.registry().insert(token, root), err)
}

pub fn unmap(overlay: &Overlay, token: &str, err: &mut impl Write) -> Result<Status> {
    let token = registry_token(overlay, token)?;
    match overlay.registry().remove(&token) {
        Ok(true) => Ok(Status::Ok),
        Ok(false) => {
            writeln!(err, "no mapping for {}", encode_token(&token))?;
            Ok(Status::Missing)
        }
        Err(e) => settle(Err(e), err),
    }
}

/// Turn a persistence failure into a warning plus [`Status::NotSaved`].
fn settle(result: Result<(), RegistryError>, err: &mut impl Write) -> Result<Status> {
    match result {
        Ok(()) => Ok(Status::Ok),
        Err(e) if e.is_persist() => {
            writeln!(err, "warning: mapping applied but not saved: {e}")?;
            Ok(Status::NotSaved)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn list(overlay: &Overlay, out: &mut impl Write) -> Result<()> {
    for entry in overlay.registry().list() {
        writeln!(out, "{} {}", encode_token(&entry.token), entry.root)?;
    }
    Ok(())
}

pub async fn cat(overlay: &Overlay, raw: &[u8], out: &mut impl Write) -> Result<()> {
    let fh = overlay.open(raw, OpenFlags::read()).await?;
    let copied = copy_out(overlay, raw, fh, out).await;
    // Close even when the copy failed; report the first error.
    let closed = overlay.close(raw, fh).await;
    copied?;
    closed?;
    Ok(())
}

async fn copy_out(
    overlay: &Overlay,
    raw: &[u8],
    fh: ucfs_core::FileHandle,
    out: &mut impl Write,
) -> Result<()> {
    loop {
        let chunk = overlay.read(raw, fh, CHUNK).await?;
        if chunk.is_empty() {
            return Ok(());
        }
        out.write_all(&chunk)?;
    }
}

pub async fn stat(overlay: &Overlay, raw: &[u8], out: &mut impl Write) -> Result<()> {
    let resolved = overlay.resolve(raw)?;
    let attr = overlay.stat(raw).await?;
    writeln!(out, "canonical: {}", resolved.canonical)?;
    writeln!(out, "kind: {}", attr.kind)?;
    writeln!(out, "size: {}", attr.size)?;
    writeln!(out, "mode: {:04o}", attr.perm)?;
    Ok(())
}

pub async fn put(overlay: &Overlay, raw: &[u8], data: &[u8]) -> Result<usize> {
    let fh = overlay.open(raw, OpenFlags::create_truncate()).await?;
    let mut written = 0;
    while written < data.len() {
        let n = overlay
            .write(raw, fh, &data[written..])
            .await
            .context("writing file")?;
        if n == 0 {
            break;
        }
        written += n;
    }
    overlay.close(raw, fh).await?;
    tracing::debug!(bytes = written, "put complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ucfs_core::normalize::Nfc;
    use ucfs_core::{DriverTable, MemoryBackend, Registry};

    fn overlay_with(registry: Registry) -> Overlay {
        let drivers = DriverTable::new();
        drivers.mount("/", MemoryBackend::new());
        Overlay::new(Arc::new(registry), Arc::new(drivers))
    }

    fn overlay() -> Overlay {
        overlay_with(Registry::new("/ucfs"))
    }

    fn text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_encode_text() {
        let overlay = overlay();
        overlay
            .registry()
            .insert(DelimiterToken::try_from("🕉️").unwrap(), "/mnt/sacred")
            .unwrap();

        let mut out = Vec::new();
        encode(&overlay, "[🕉️]music[🕉️]chants[🕉️]108.mp3".as_bytes(), false, &mut out).unwrap();
        assert_eq!(
            text(out),
            "delimiter: 🕉️ (hex f09f9589efb88f)\n\
             components: [\"music\", \"chants\", \"108.mp3\"]\n\
             canonical: /mnt/sacred/f09f9589efb88f/music/chants/108.mp3\n\
             sidecar: /mnt/sacred/.meta/f09f9589efb88f/music/chants/108.mp3\n"
        );
    }

    #[test]
    fn test_encode_json() {
        let mut out = Vec::new();
        encode(&overlay(), b"[a]Home[a]Docs[a]resume.txt", true, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["delimiter"], "a");
        assert_eq!(value["delimiter_hex"], "61");
        assert_eq!(value["components"], json!(["Home", "Docs", "resume.txt"]));
        assert_eq!(value["canonical_path"], "/ucfs/61/Home/Docs/resume.txt");
    }

    #[test]
    fn test_parse_error_line() {
        let err: anyhow::Error = encode(&overlay(), b"[a]Home[a][a]x", false, &mut Vec::new())
            .unwrap_err();
        assert_eq!(error_line(&err), "error: EmptyComponent at byte 10");

        let err = encode(&overlay(), b"Foo[a]Bar", false, &mut Vec::new()).unwrap_err();
        assert_eq!(error_line(&err), "error: MissingRoot at byte 0");
    }

    #[test]
    fn test_map_unmap_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("registry");
        let overlay = overlay_with(Registry::with_store("/ucfs", &store));
        let mut err = Vec::new();

        assert_eq!(map(&overlay, "🕉️", "/mnt/sacred", &mut err).unwrap(), Status::Ok);
        assert_eq!(map(&overlay, "a", "/alpha", &mut err).unwrap(), Status::Ok);

        let mut out = Vec::new();
        list(&overlay, &mut out).unwrap();
        assert_eq!(text(out), "🕉️ /mnt/sacred\na /alpha\n");
        assert!(std::fs::read_to_string(&store).unwrap().contains("a /alpha"));

        assert_eq!(unmap(&overlay, "a", &mut err).unwrap(), Status::Ok);
        assert_eq!(unmap(&overlay, "a", &mut err).unwrap(), Status::Missing);
        assert_eq!(text(err), "no mapping for a\n");
    }

    #[test]
    fn test_map_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the registry file should be.
        let store = dir.path().join("registry");
        std::fs::create_dir_all(store.join("occupied")).unwrap();
        let overlay = overlay_with(Registry::with_store("/ucfs", &store));

        let mut err = Vec::new();
        let status = map(&overlay, "a", "/alpha", &mut err).unwrap();
        assert_eq!(status, Status::NotSaved);
        assert!(text(err).starts_with("warning: mapping applied but not saved"));
        assert_eq!(
            overlay.registry().lookup(&DelimiterToken::try_from("a").unwrap()),
            "/alpha"
        );
    }

    #[test]
    fn test_map_rejects_empty_token() {
        assert!(map(&overlay(), "", "/x", &mut Vec::new()).is_err());
    }

    #[test]
    fn test_map_rejects_unstorable_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("registry");
        let overlay = overlay_with(Registry::with_store("/ucfs", &store));
        let mut err = Vec::new();
        assert_eq!(map(&overlay, "b", "/b", &mut err).unwrap(), Status::Ok);

        for root in ["", "/x\nb /evil"] {
            let e = map(&overlay, "a", root, &mut err).unwrap_err();
            assert!(matches!(
                e.downcast_ref::<RegistryError>(),
                Some(RegistryError::InvalidRoot { .. })
            ));
        }
        assert!(err.is_empty());
        assert_eq!(Registry::open("/ucfs", &store).unwrap().len(), 1);
    }

    #[test]
    fn test_map_normalizes_token() {
        let overlay = overlay().with_normalizer(Box::new(Nfc));
        let mut err = Vec::new();

        assert_eq!(map(&overlay, "e\u{301}", "/mnt/accent", &mut err).unwrap(), Status::Ok);
        let resolved = overlay.resolve("[e\u{301}]x".as_bytes()).unwrap();
        assert_eq!(resolved.root, "/mnt/accent");

        assert_eq!(unmap(&overlay, "e\u{301}", &mut err).unwrap(), Status::Ok);
        assert!(overlay.registry().is_empty());
    }

    #[tokio::test]
    async fn test_put_cat_stat() {
        let overlay = overlay();
        let raw = "[🌍]🏠[🌍]notes.txt".as_bytes();

        assert_eq!(put(&overlay, raw, b"hello world").await.unwrap(), 11);

        let mut out = Vec::new();
        cat(&overlay, raw, &mut out).await.unwrap();
        assert_eq!(out, b"hello world");

        let mut out = Vec::new();
        stat(&overlay, raw, &mut out).await.unwrap();
        let out = text(out);
        assert!(out.starts_with("canonical: /ucfs/f09f8c8d/🏠/notes.txt\nkind: file\nsize: 11\n"));
    }

    #[tokio::test]
    async fn test_cat_missing_is_backing_error() {
        let err = cat(&overlay(), b"[a]nope", &mut Vec::new()).await.unwrap_err();
        let ucfs = err.downcast_ref::<UcfsError>().unwrap();
        assert!(ucfs.is_backing());
        assert!(error_line(&err).starts_with("error: backing store failed for /ucfs/61/nope"));
    }
}
