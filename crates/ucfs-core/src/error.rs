//! Overlay error taxonomy.
//!
//! Callers can tell a malformed path (`Parse`) apart from a failing store
//! (`Backing`) without inspecting messages.

use thiserror::Error;

use crate::canonical::CanonicalizeError;
use crate::codec::{ParseError, ParseErrorKind};
use crate::registry::RegistryError;
use crate::vfs::VfsError;

/// Any failure surfaced by the overlay.
#[derive(Debug, Error)]
pub enum UcfsError {
    /// The raw path is not valid UCFS syntax.
    #[error("invalid UCFS path: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// No driver is mounted for the resolved backing root.
    #[error("no backing driver serves {root}")]
    NoDriver { root: String },

    /// The backing driver failed. The cause is kept intact.
    #[error("backing store failed for {canonical}: {source}")]
    Backing {
        canonical: String,
        #[source]
        source: VfsError,
    },
}

impl UcfsError {
    /// The parse rule that failed, for parse errors.
    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            UcfsError::Parse(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether the failure came from the backing store.
    pub fn is_backing(&self) -> bool {
        matches!(self, UcfsError::Backing { .. })
    }
}

/// Overlay result type.
pub type UcfsResult<T> = Result<T, UcfsError>;
