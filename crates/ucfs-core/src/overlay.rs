//! Overlay driver.
//!
//! Accepts operations addressed by raw UCFS paths and forwards them to the
//! backing driver that serves the path's delimiter:
//!
//! ```text
//! Received → Parsed → Resolved → Dispatched → Completed
//!    └→ ParseFailed        └→ Failed    └→ Failed
//! ```
//!
//! Every request is independent: it is parsed and resolved from scratch,
//! nothing is cached, nothing is retried. The registry read lock is released
//! before the driver is called, so slow I/O never blocks registry updates.
//! Timeouts and cancellation are whatever the backing driver provides.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use strum::Display;

use crate::canonical::{CanonicalPath, to_canonical};
use crate::codec::{self, DelimiterToken, UcfsPath};
use crate::error::{UcfsError, UcfsResult};
use crate::normalize::{Normalizer, Passthrough};
use crate::registry::Registry;
use crate::sidecar::metadata_path_for;
use crate::vfs::{BackingDriver, DriverTable, FileAttr, FileHandle, OpenFlags, VfsError};

/// Where a request is in its lifecycle. Logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RequestState {
    Received,
    Parsed,
    ParseFailed,
    Resolved,
    Dispatched,
    Completed,
    Failed,
}

/// What to do at the resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Open(OpenFlags),
    Read { handle: FileHandle, len: usize },
    Write { handle: FileHandle, data: Vec<u8> },
    Stat,
    Create { mode: u32 },
    Close(FileHandle),
}

/// An operation addressed by a raw UCFS path.
///
/// For handle operations the path selects which backing driver owns the
/// handle. Handles are numbered across all drivers, so if a remap sends the
/// path to a different driver than the one that opened it, the operation
/// fails with [`VfsError::BadHandle`] instead of touching another file.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: Vec<u8>,
    pub op: Operation,
}

impl Request {
    pub fn new(path: impl Into<Vec<u8>>, op: Operation) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Result of a completed request, relayed unchanged from the driver.
#[derive(Debug, Clone)]
pub enum Outcome {
    Opened(FileHandle),
    Data(Vec<u8>),
    Written(usize),
    Attr(FileAttr),
    Created(FileAttr),
    Closed,
}

/// A raw path taken through parse, registry lookup and canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: UcfsPath,
    pub root: String,
    pub canonical: CanonicalPath,
}

/// Translates UCFS paths and forwards operations to backing drivers.
pub struct Overlay {
    registry: Arc<Registry>,
    drivers: Arc<DriverTable>,
    normalizer: Box<dyn Normalizer>,
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("registry", &self.registry)
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}

impl Overlay {
    /// Overlay with no normalization pre-pass.
    pub fn new(registry: Arc<Registry>, drivers: Arc<DriverTable>) -> Self {
        Self {
            registry,
            drivers,
            normalizer: Box::new(Passthrough),
        }
    }

    /// Run `normalizer` over every raw path before parsing.
    pub fn with_normalizer(mut self, normalizer: Box<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn drivers(&self) -> &Arc<DriverTable> {
        &self.drivers
    }

    /// Whether a host path belongs to this overlay.
    pub fn intercepts(raw: &[u8]) -> bool {
        codec::is_ucfs_path(raw)
    }

    /// `token` as the pre-pass would leave it inside a path.
    ///
    /// Registry keys must go through this, or a mapping made with one
    /// spelling would never match the normalized paths `resolve` looks up.
    /// A token the pre-pass would turn invalid is kept as given.
    pub fn normalize_token(&self, token: DelimiterToken) -> DelimiterToken {
        match self.normalizer.normalize(token.as_bytes()) {
            Cow::Borrowed(_) => token,
            Cow::Owned(bytes) => DelimiterToken::new(bytes).unwrap_or(token),
        }
    }

    /// Parse `raw` and work out where it lives, without touching a driver.
    pub fn resolve(&self, raw: &[u8]) -> UcfsResult<Resolved> {
        let normalized = self.normalizer.normalize(raw);
        let path = codec::parse(&normalized).inspect_err(|e| {
            tracing::debug!(state = %RequestState::ParseFailed, kind = %e.kind, offset = e.offset);
        })?;
        tracing::trace!(state = %RequestState::Parsed, components = path.components().len());

        // Copies the root out; the read lock is already released here.
        let root = self.registry.lookup(path.delimiter());
        let canonical = to_canonical(&path, Some(&root));
        tracing::debug!(state = %RequestState::Resolved, root = %root, canonical = %canonical);

        Ok(Resolved {
            path,
            root,
            canonical,
        })
    }

    /// Sidecar location for the file `raw` names.
    pub fn metadata_path(&self, raw: &[u8]) -> UcfsResult<String> {
        Ok(metadata_path_for(&self.resolve(raw)?.canonical))
    }

    /// Run one request to completion.
    #[tracing::instrument(level = "debug", skip(self, request), fields(op = %request.op))]
    pub async fn handle(&self, request: Request) -> UcfsResult<Outcome> {
        tracing::trace!(state = %RequestState::Received);
        let resolved = self.resolve(&request.path)?;

        let driver = self
            .drivers
            .select(&resolved.root)
            .ok_or_else(|| UcfsError::NoDriver {
                root: resolved.root.clone(),
            })?;

        let canonical = resolved.canonical.as_str();
        tracing::debug!(state = %RequestState::Dispatched, canonical);
        let result = dispatch(driver.as_ref(), Path::new(canonical), request.op).await;

        match result {
            Ok(outcome) => {
                tracing::debug!(state = %RequestState::Completed);
                Ok(outcome)
            }
            Err(source) => {
                tracing::debug!(state = %RequestState::Failed, error = %source);
                Err(UcfsError::Backing {
                    canonical: canonical.to_string(),
                    source,
                })
            }
        }
    }

    // ========================================================================
    // Typed convenience wrappers
    // ========================================================================

    pub async fn open(&self, raw: impl Into<Vec<u8>>, flags: OpenFlags) -> UcfsResult<FileHandle> {
        match self.handle(Request::new(raw, Operation::Open(flags))).await? {
            Outcome::Opened(fh) => Ok(fh),
            other => Err(unexpected(other)),
        }
    }

    pub async fn read(
        &self,
        raw: impl Into<Vec<u8>>,
        handle: FileHandle,
        len: usize,
    ) -> UcfsResult<Vec<u8>> {
        match self
            .handle(Request::new(raw, Operation::Read { handle, len }))
            .await?
        {
            Outcome::Data(data) => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    pub async fn write(
        &self,
        raw: impl Into<Vec<u8>>,
        handle: FileHandle,
        data: impl Into<Vec<u8>>,
    ) -> UcfsResult<usize> {
        let op = Operation::Write {
            handle,
            data: data.into(),
        };
        match self.handle(Request::new(raw, op)).await? {
            Outcome::Written(n) => Ok(n),
            other => Err(unexpected(other)),
        }
    }

    pub async fn stat(&self, raw: impl Into<Vec<u8>>) -> UcfsResult<FileAttr> {
        match self.handle(Request::new(raw, Operation::Stat)).await? {
            Outcome::Attr(attr) => Ok(attr),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create(&self, raw: impl Into<Vec<u8>>, mode: u32) -> UcfsResult<FileAttr> {
        match self
            .handle(Request::new(raw, Operation::Create { mode }))
            .await?
        {
            Outcome::Created(attr) => Ok(attr),
            other => Err(unexpected(other)),
        }
    }

    pub async fn close(&self, raw: impl Into<Vec<u8>>, handle: FileHandle) -> UcfsResult<()> {
        match self
            .handle(Request::new(raw, Operation::Close(handle)))
            .await?
        {
            Outcome::Closed => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

/// Forward one operation. Exactly one driver call per request.
async fn dispatch(
    driver: &dyn BackingDriver,
    path: &Path,
    op: Operation,
) -> Result<Outcome, VfsError> {
    Ok(match op {
        Operation::Open(flags) => Outcome::Opened(driver.open(path, flags).await?),
        Operation::Read { handle, len } => Outcome::Data(driver.read(handle, len).await?),
        Operation::Write { handle, data } => Outcome::Written(driver.write(handle, &data).await?),
        Operation::Stat => Outcome::Attr(driver.stat(path).await?),
        Operation::Create { mode } => Outcome::Created(driver.create(path, mode).await?),
        Operation::Close(handle) => {
            driver.close(handle).await?;
            Outcome::Closed
        }
    })
}

// Each wrapper builds the matching Operation, so a mismatched outcome is a
// driver contract violation rather than caller error.
fn unexpected(outcome: Outcome) -> UcfsError {
    UcfsError::Backing {
        canonical: String::new(),
        source: VfsError::other(format!("driver returned unexpected outcome {outcome:?}")),
    }
}
