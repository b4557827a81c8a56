//! UTF-8 scalar scanner.
//!
//! Determines the byte length of the scalar starting at an offset using only
//! the leading byte's high-bit pattern and the continuation bytes that follow.
//! No code point property tables are consulted. This is the only place in the
//! codec that knows about multi-byte sequences; everything above it advances
//! in whole-scalar steps.

use thiserror::Error;

/// The bytes at an offset do not start a well-formed UTF-8 scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("malformed UTF-8 at byte {offset}")]
pub struct MalformedEncoding {
    /// Offset of the leading byte of the bad sequence.
    pub offset: usize,
}

/// Return the length (1..=4) of the scalar beginning at `offset`.
///
/// Rejects stray continuation bytes, the never-valid leading bytes
/// (`0xC0`, `0xC1`, `0xF5..=0xFF`), truncated sequences, overlong encodings,
/// UTF-16 surrogates, and values above U+10FFFF.
///
/// `offset` must be less than `buf.len()`.
pub fn scalar_len(buf: &[u8], offset: usize) -> Result<usize, MalformedEncoding> {
    let err = MalformedEncoding { offset };
    let lead = *buf.get(offset).ok_or(err)?;

    let len = match lead {
        0x00..=0x7F => return Ok(1),
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Err(err),
    };

    let tail = buf.get(offset + 1..offset + len).ok_or(err)?;
    if !tail.iter().all(|b| is_continuation(*b)) {
        return Err(err);
    }

    // Second-byte ranges that exclude overlongs, surrogates and > U+10FFFF.
    let second = tail[0];
    let in_range = match lead {
        0xE0 => second >= 0xA0,
        0xED => second <= 0x9F,
        0xF0 => second >= 0x90,
        0xF4 => second <= 0x8F,
        _ => true,
    };
    if !in_range {
        return Err(err);
    }

    Ok(len)
}

#[inline]
fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        assert_eq!(scalar_len(b"abc", 0), Ok(1));
        assert_eq!(scalar_len(b"abc", 2), Ok(1));
    }

    #[test]
    fn test_multibyte_lengths() {
        assert_eq!(scalar_len("é".as_bytes(), 0), Ok(2));
        assert_eq!(scalar_len("ॐ".as_bytes(), 0), Ok(3));
        assert_eq!(scalar_len("🌍".as_bytes(), 0), Ok(4));
        // variation selector U+FE0F
        assert_eq!(scalar_len("\u{FE0F}".as_bytes(), 0), Ok(3));
    }

    #[test]
    fn test_offset_inside_buffer() {
        let s = "a🕉b".as_bytes();
        assert_eq!(scalar_len(s, 1), Ok(4));
        assert_eq!(scalar_len(s, 5), Ok(1));
    }

    #[test]
    fn test_stray_continuation() {
        let s = "🌍".as_bytes();
        assert_eq!(scalar_len(s, 1), Err(MalformedEncoding { offset: 1 }));
        assert!(scalar_len(&[0x80], 0).is_err());
    }

    #[test]
    fn test_truncated() {
        let s = &"🌍".as_bytes()[..3];
        assert_eq!(scalar_len(s, 0), Err(MalformedEncoding { offset: 0 }));
        assert!(scalar_len(&[0xC3], 0).is_err());
    }

    #[test]
    fn test_invalid_leads() {
        for lead in [0xC0u8, 0xC1, 0xF5, 0xF8, 0xFF] {
            assert!(scalar_len(&[lead, 0x80, 0x80, 0x80], 0).is_err(), "{lead:#x}");
        }
    }

    #[test]
    fn test_overlong_and_surrogates() {
        // overlong '/' in three bytes
        assert!(scalar_len(&[0xE0, 0x80, 0xAF], 0).is_err());
        // U+D800
        assert!(scalar_len(&[0xED, 0xA0, 0x80], 0).is_err());
        // overlong four-byte
        assert!(scalar_len(&[0xF0, 0x80, 0x80, 0x80], 0).is_err());
        // U+110000
        assert!(scalar_len(&[0xF4, 0x90, 0x80, 0x80], 0).is_err());
    }

    #[test]
    fn test_continuation_not_completed() {
        assert!(scalar_len(&[0xE2, 0x82, b'a'], 0).is_err());
    }

    #[test]
    fn test_agrees_with_std_on_valid_text() {
        let text = "[🕉️]music[🕉️]chants — ॐ नमः शिवाय";
        let bytes = text.as_bytes();
        let mut offset = 0;
        for ch in text.chars() {
            assert_eq!(scalar_len(bytes, offset), Ok(ch.len_utf8()));
            offset += ch.len_utf8();
        }
        assert_eq!(offset, bytes.len());
    }
}
