//! UCFS path codec.
//!
//! A UCFS path opens with a bracketed delimiter token and then uses the same
//! bracketed token between every component:
//!
//! ```text
//! [🕉️]music[🕉️]chants[🕉️]108.mp3
//! ```
//!
//! The token is whatever raw bytes sit between the first `[` and the first
//! `]`. It is never normalized or decoded into a single code point, so two
//! tokens that render identically but differ in bytes (for example with and
//! without a variation selector) are distinct namespaces.

use std::fmt;

use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::scanner::scalar_len;

/// Opening bracket of a delimiter occurrence.
pub const OPEN: u8 = b'[';
/// Closing bracket of a delimiter occurrence.
pub const CLOSE: u8 = b']';

// ============================================================================
// Errors
// ============================================================================

/// Which parse rule a rejected path broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ParseErrorKind {
    /// Input is empty or does not start with `[`.
    MissingRoot,
    /// No `]` closes the leading `[`.
    UnterminatedDelimiter,
    /// The leading `[]` pair is empty.
    EmptyDelimiter,
    /// Two delimiter occurrences are adjacent, or the path ends in one.
    EmptyComponent,
    /// A byte sequence is not well-formed UTF-8.
    MalformedEncoding,
}

/// A rejected UCFS path, with the byte offset where the problem was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at byte {offset}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl ParseError {
    fn new(kind: ParseErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// A token or component that cannot appear in a UCFS path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("delimiter token is empty")]
    EmptyDelimiter,

    #[error("delimiter token contains '[' or ']'")]
    BracketInDelimiter,

    #[error("path has no components")]
    NoComponents,

    #[error("component {0} is empty")]
    EmptyComponent(usize),

    #[error("component {0} contains the delimiter")]
    DelimiterInComponent(usize),

    #[error("component {0} is not valid UTF-8")]
    MalformedComponent(usize),
}

// ============================================================================
// Data model
// ============================================================================

/// The raw bytes between the leading `[` and `]` of a UCFS path.
///
/// Equality and hashing are byte-exact.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelimiterToken(Box<[u8]>);

impl DelimiterToken {
    /// Validate and wrap a token: non-empty, no `[` or `]`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, PathError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(PathError::EmptyDelimiter);
        }
        if bytes.iter().any(|b| *b == OPEN || *b == CLOSE) {
            return Err(PathError::BracketInDelimiter);
        }
        Ok(Self(bytes.into_boxed_slice()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex of the raw bytes. Injective, so byte-distinct tokens
    /// never share a canonical directory.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Length of the bracketed occurrence `[token]`.
    pub fn occurrence_len(&self) -> usize {
        self.0.len() + 2
    }

    /// Whether `[token]` starts exactly at `haystack[0]`.
    fn occurs_at(&self, haystack: &[u8]) -> bool {
        haystack.len() >= self.occurrence_len()
            && haystack[0] == OPEN
            && haystack[1..=self.0.len()] == *self.0
            && haystack[self.0.len() + 1] == CLOSE
    }

    /// Whether `[token]` appears anywhere in `bytes`.
    fn occurs_in(&self, bytes: &[u8]) -> bool {
        (0..bytes.len()).any(|i| self.occurs_at(&bytes[i..]))
    }
}

impl fmt::Debug for DelimiterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelimiterToken({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for DelimiterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<&str> for DelimiterToken {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s.as_bytes())
    }
}

/// One non-empty path segment, kept byte-for-byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Component(Box<str>);

impl Component {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for Component {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// A parsed UCFS path: a delimiter token plus at least one component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UcfsPath {
    delimiter: DelimiterToken,
    components: Vec<Component>,
}

impl UcfsPath {
    /// Build a path from parts, enforcing the same invariants `parse` does.
    pub fn from_parts<I, C>(delimiter: DelimiterToken, components: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let mut out = Vec::new();
        for (i, c) in components.into_iter().enumerate() {
            let bytes: Vec<u8> = c.into();
            if bytes.is_empty() {
                return Err(PathError::EmptyComponent(i));
            }
            if delimiter.occurs_in(&bytes) {
                return Err(PathError::DelimiterInComponent(i));
            }
            let text = String::from_utf8(bytes).map_err(|_| PathError::MalformedComponent(i))?;
            out.push(Component(text.into_boxed_str()));
        }
        if out.is_empty() {
            return Err(PathError::NoComponents);
        }
        Ok(Self {
            delimiter,
            components: out,
        })
    }

    pub fn delimiter(&self) -> &DelimiterToken {
        &self.delimiter
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn into_parts(self) -> (DelimiterToken, Vec<Component>) {
        (self.delimiter, self.components)
    }

    /// Render back to UCFS syntax: `[D]c0[D]c1...`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let occ = self.delimiter.occurrence_len();
        let len = self
            .components
            .iter()
            .map(|c| occ + c.0.len())
            .sum();
        let mut out = Vec::with_capacity(len);
        for c in &self.components {
            out.push(OPEN);
            out.extend_from_slice(self.delimiter.as_bytes());
            out.push(CLOSE);
            out.extend_from_slice(c.as_bytes());
        }
        out
    }
}

impl fmt::Display for UcfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl std::str::FromStr for UcfsPath {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s.as_bytes())
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse a raw UCFS path.
///
/// Input should already have been through the normalization pre-pass (see
/// [`crate::normalize`]); this function never rewrites bytes.
///
/// Every input yields either a path with at least one component or exactly
/// one [`ParseError`]. Components always end on scalar boundaries.
pub fn parse(raw: &[u8]) -> Result<UcfsPath, ParseError> {
    use ParseErrorKind::*;

    if raw.first() != Some(&OPEN) {
        return Err(ParseError::new(MissingRoot, 0));
    }

    // Token: advance by scalars to the first ']'.
    let mut cursor = 1;
    let close = loop {
        match raw.get(cursor) {
            None => return Err(ParseError::new(UnterminatedDelimiter, raw.len())),
            Some(&CLOSE) => break cursor,
            // A second '[' before any ']' means the first was never closed.
            Some(&OPEN) => return Err(ParseError::new(UnterminatedDelimiter, cursor)),
            Some(_) => {
                cursor += scalar_len(raw, cursor)
                    .map_err(|e| ParseError::new(MalformedEncoding, e.offset))?;
            }
        }
    };
    if close == 1 {
        return Err(ParseError::new(EmptyDelimiter, close));
    }
    let delimiter = DelimiterToken(raw[1..close].into());

    let mut components = Vec::new();
    let mut start = close + 1;
    cursor = start;

    while cursor < raw.len() {
        if delimiter.occurs_at(&raw[cursor..]) {
            if cursor == start {
                return Err(ParseError::new(EmptyComponent, cursor));
            }
            components.push(component(raw, start, cursor)?);
            cursor += delimiter.occurrence_len();
            start = cursor;
        } else {
            cursor += scalar_len(raw, cursor)
                .map_err(|e| ParseError::new(MalformedEncoding, e.offset))?;
        }
    }

    if cursor == start {
        // Either "[D]" alone or a trailing delimiter.
        return Err(ParseError::new(EmptyComponent, raw.len()));
    }
    components.push(component(raw, start, cursor)?);

    Ok(UcfsPath {
        delimiter,
        components,
    })
}

/// Wrap `raw[start..end]`, which the scanner has already walked.
fn component(raw: &[u8], start: usize, end: usize) -> Result<Component, ParseError> {
    std::str::from_utf8(&raw[start..end])
        .map(|s| Component(s.into()))
        .map_err(|e| ParseError::new(ParseErrorKind::MalformedEncoding, start + e.valid_up_to()))
}

/// Whether `raw` should be routed to the overlay at all (starts with `[`).
pub fn is_ucfs_path(raw: &[u8]) -> bool {
    raw.first() == Some(&OPEN)
}
