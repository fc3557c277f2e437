//! Escaped-text to raw-bytes decoding for catalog patterns.
//!
//! Catalog files are plain text but signatures are binary, so every
//! pattern is written with backslash escapes for the bytes that are not
//! printable. Decoding works on the raw bytes of the pattern field:
//!
//! - `\xHH` - two hex digits
//! - `\N`, `\NN`, `\NNN` - octal, value must fit in a byte
//! - `\\ \' \" \| \a \b \f \n \r \t \v` - the usual single-byte escapes
//! - any other byte - copied unchanged, so a raw `é` saved as UTF-8 gives
//!   `C3 A9` and the same character saved as Latin-1 gives `E9`

use thiserror::Error;

/// Why a pattern could not be decoded. Offsets are byte positions within
/// the escaped text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscapeError {
    #[error("pattern ends with a lone backslash")]
    TrailingBackslash,

    #[error("invalid \\x escape at offset {offset}: expected two hex digits")]
    InvalidHex { offset: usize },

    #[error("octal escape at offset {offset} is out of byte range ({value})")]
    OctalOutOfRange { offset: usize, value: u32 },

    #[error("unknown escape '\\{}' at offset {offset}", .byte.escape_ascii())]
    UnknownEscape { offset: usize, byte: u8 },
}

/// Decode an escaped pattern into the exact bytes it denotes.
pub fn decode_pattern(text: impl AsRef<[u8]>) -> Result<Vec<u8>, EscapeError> {
    let text = text.as_ref();
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        let b = text[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }

        let start = i;
        let esc = *text.get(i + 1).ok_or(EscapeError::TrailingBackslash)?;
        i += 2;

        let byte = match esc {
            b'x' => {
                let hi = text.get(i).and_then(|&c| hex_digit(c));
                let lo = text.get(i + 1).and_then(|&c| hex_digit(c));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        i += 2;
                        hi * 16 + lo
                    }
                    _ => return Err(EscapeError::InvalidHex { offset: start }),
                }
            }
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match text.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).map_err(|_| EscapeError::OctalOutOfRange {
                    offset: start,
                    value,
                })?
            }
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'|' => b'|',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0B,
            other => {
                return Err(EscapeError::UnknownEscape {
                    offset: start,
                    byte: other,
                })
            }
        };
        out.push(byte);
    }

    Ok(out)
}

/// Render raw bytes back into catalog notation. Printable ASCII is kept
/// as-is; everything else becomes `\xHH`.
pub fn encode_pattern(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'|' => out.push_str("\\|"),
            0x21..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_ascii() {
        assert_eq!(decode_pattern("%PDF").unwrap(), b"%PDF");
    }

    #[test]
    fn test_hex_escapes() {
        assert_eq!(
            decode_pattern("\\x89PNG\\r\\n\\x1a\\n").unwrap(),
            vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
        );
        assert_eq!(decode_pattern("\\xFF\\xd8").unwrap(), vec![0xFF, 0xD8]);
    }

    #[test]
    fn test_octal_escapes() {
        assert_eq!(decode_pattern("\\0").unwrap(), vec![0]);
        assert_eq!(decode_pattern("\\377").unwrap(), vec![0xFF]);
        // Octal stops after three digits
        assert_eq!(decode_pattern("\\1011").unwrap(), vec![b'A', b'1']);
        assert_eq!(decode_pattern("\\12x").unwrap(), vec![0x0A, b'x']);
    }

    #[test]
    fn test_octal_out_of_range() {
        assert_eq!(
            decode_pattern("ab\\400"),
            Err(EscapeError::OctalOutOfRange {
                offset: 2,
                value: 256
            })
        );
    }

    #[test]
    fn test_escaped_backslash_and_pipe() {
        assert_eq!(decode_pattern("{\\\\rtf").unwrap(), b"{\\rtf");
        assert_eq!(decode_pattern("a\\|b").unwrap(), b"a|b");
    }

    #[test]
    fn test_raw_bytes_are_copied_unchanged() {
        assert_eq!(decode_pattern(b"\xff\xd8").unwrap(), vec![0xFF, 0xD8]);
        assert_eq!(
            decode_pattern("\u{e9}t\u{e9}").unwrap(),
            vec![0xC3, 0xA9, b't', 0xC3, 0xA9]
        );
        assert_eq!(decode_pattern(b"\xe9\\x41").unwrap(), vec![0xE9, b'A']);
    }

    #[test]
    fn test_errors() {
        assert_eq!(decode_pattern("abc\\"), Err(EscapeError::TrailingBackslash));
        assert_eq!(
            decode_pattern("\\xZ1"),
            Err(EscapeError::InvalidHex { offset: 0 })
        );
        assert_eq!(
            decode_pattern("\\x4"),
            Err(EscapeError::InvalidHex { offset: 0 })
        );
        assert_eq!(
            decode_pattern("ok\\q"),
            Err(EscapeError::UnknownEscape {
                offset: 2,
                byte: b'q'
            })
        );
        assert_eq!(
            decode_pattern("ok\\q").unwrap_err().to_string(),
            "unknown escape '\\q' at offset 2"
        );
    }

    #[test]
    fn test_encode_readable() {
        assert_eq!(encode_pattern(b"PK\x03\x04"), "PK\\x03\\x04");
        assert_eq!(encode_pattern(b"{\\rtf"), "{\\\\rtf");
        assert_eq!(encode_pattern(b"a b"), "a\\x20b");
    }

    proptest! {
        #[test]
        fn prop_decode_is_deterministic(text in "[ -~]{0,24}") {
            let first = decode_pattern(&text);
            let second = decode_pattern(&text);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_hex_escape_preserves_every_byte(
            bytes in proptest::collection::vec(any::<u8>(), 1..16)
        ) {
            let text: String = bytes.iter().map(|b| format!("\\x{:02x}", b)).collect();
            prop_assert_eq!(decode_pattern(&text).unwrap(), bytes);
        }

        #[test]
        fn prop_encoded_form_decodes_to_same_bytes(
            bytes in proptest::collection::vec(any::<u8>(), 1..16)
        ) {
            prop_assert_eq!(decode_pattern(&encode_pattern(&bytes)).unwrap(), bytes);
        }
    }
}
