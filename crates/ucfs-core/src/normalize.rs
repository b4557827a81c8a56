//! Normalization pre-pass.
//!
//! Raw paths go through a [`Normalizer`] before [`crate::codec::parse`] sees
//! them. The parser itself never rewrites bytes; whatever the pre-pass hands
//! over is what gets matched, byte for byte.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use unicode_normalization::{IsNormalized, UnicodeNormalization, is_nfc_quick};

/// Rewrites a raw path into the form the parser should see.
///
/// Implementations must be deterministic and must return input that is not
/// valid UTF-8 unchanged, so the parser can report where it breaks.
pub trait Normalizer: Send + Sync {
    fn normalize<'a>(&self, raw: &'a [u8]) -> Cow<'a, [u8]>;
}

/// Leaves input untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Normalizer for Passthrough {
    fn normalize<'a>(&self, raw: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(raw)
    }
}

/// Unicode NFC.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nfc;

impl Normalizer for Nfc {
    fn normalize<'a>(&self, raw: &'a [u8]) -> Cow<'a, [u8]> {
        let Ok(text) = std::str::from_utf8(raw) else {
            return Cow::Borrowed(raw);
        };
        if is_nfc_quick(text.chars()) == IsNormalized::Yes {
            return Cow::Borrowed(raw);
        }
        Cow::Owned(text.nfc().collect::<String>().into_bytes())
    }
}

/// Normalization selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    None,
    #[default]
    Nfc,
}

impl NormalizeMode {
    pub fn normalizer(self) -> Box<dyn Normalizer> {
        match self {
            NormalizeMode::None => Box::new(Passthrough),
            NormalizeMode::Nfc => Box::new(Nfc),
        }
    }
}
