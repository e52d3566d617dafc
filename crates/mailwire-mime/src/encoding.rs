//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable and charset conversion. RFC 2047 header
//! words live in [`crate::encoded_word`].

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::Encoding;
use std::fmt::Write as _;

/// Maximum encoded line length for Quoted-Printable and Base64 bodies.
pub const MAX_LINE_LENGTH: usize = 76;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64, wrapped into CRLF-separated lines of at most
/// [`MAX_LINE_LENGTH`] characters.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);
    // Base64 output is pure ASCII, so byte chunks are valid char boundaries.
    for (i, chunk) in encoded.as_bytes().chunks(MAX_LINE_LENGTH).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        out.extend(chunk.iter().map(|&b| b as char));
    }
    out
}

/// Decodes Base64 data, ignoring any embedded whitespace (line breaks).
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Printable ASCII (except `=`), space and tab pass through; every other
/// byte, including CR and LF, becomes `=XX`. Soft line breaks keep each
/// encoded line within [`MAX_LINE_LENGTH`] characters. Whitespace that would
/// end the output is escaped so it survives transports that strip trailing
/// blanks.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::with_capacity(bytes.len() + bytes.len() / 2);
    let mut line_length = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        let last = i + 1 == bytes.len();
        let literal = match byte {
            b' ' | b'\t' => !last,
            b'=' => false,
            0x21..=0x7E => true,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Room must remain for the trailing '=' of a soft break.
        if line_length + width > MAX_LINE_LENGTH - 1 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            result.push(byte as char);
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
    }

    result
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Soft line breaks (`=\r\n`, and the lenient `=\n`) are removed and `=XX`
/// escapes replaced by the byte they name.
///
/// # Errors
///
/// Returns an error if the input contains an invalid or truncated escape.
pub fn decode_quoted_printable_bytes(input: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        match (input.get(i + 1), input.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => {
                let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) else {
                    return Err(Error::InvalidEncoding(format!(
                        "invalid quoted-printable escape at byte {i}"
                    )));
                };
                result.push((hi << 4) | lo);
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "incomplete quoted-printable escape".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

/// Decodes Quoted-Printable text into a UTF-8 string.
///
/// # Errors
///
/// Returns an error if the escapes are invalid or the decoded bytes are not
/// UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let bytes = decode_quoted_printable_bytes(text.as_bytes())?;
    String::from_utf8(bytes).map_err(Into::into)
}

/// Converts bytes in the given charset to a `String`.
///
/// Charsets known to `encoding_rs` are honoured. Anything else (including no
/// charset at all) is read as UTF-8, falling back to Latin-1 when the bytes
/// are not valid UTF-8. Never fails.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    if let Some(encoding) = charset.and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        && encoding != encoding_rs::UTF_8
    {
        let (decoded, _) = encoding.decode_without_bom_handling(bytes);
        return decoded.into_owned();
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_decode_ignores_line_breaks() {
        let decoded = decode_base64("SGVsbG8s\r\nIFdvcmxk\r\nIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_wrapped_line_length() {
        let data = vec![0xABu8; 300];
        let wrapped = encode_base64_wrapped(&data);
        for line in wrapped.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert_eq!(decode_base64(&wrapped).unwrap(), data);
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!");
        assert!(encoded.contains("=C3=A9"));

        assert_eq!(encode_quoted_printable("a=b"), "a=3Db");
        assert_eq!(encode_quoted_printable("line1\r\nline2"), "line1=0D=0Aline2");
        assert_eq!(encode_quoted_printable("trailing "), "trailing=20");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let text = "x".repeat(200);
        let encoded = encode_quoted_printable(&text);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH, "line too long: {}", line.len());
        }
        assert!(encoded.contains("=\r\n"));
    }

    #[test]
    fn test_quoted_printable_escape_never_split() {
        let text = "é".repeat(60);
        let encoded = encode_quoted_printable(&text);
        for line in encoded.split("\r\n") {
            let content = line.strip_suffix('=').unwrap_or(line);
            assert_eq!(content.len() % 3, 0, "escape split across lines: {line}");
        }
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("Hello, World!").unwrap(), "Hello, World!");
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo");
        assert_eq!(decode_quoted_printable("h=c3=a9llo").unwrap(), "héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), "HelloWorld");
        assert_eq!(decode_quoted_printable("Hello=\nWorld").unwrap(), "HelloWorld");
    }

    #[test]
    fn test_quoted_printable_decode_errors() {
        assert!(decode_quoted_printable("bad=ZZ").is_err());
        assert!(decode_quoted_printable("truncated=4").is_err());
    }

    #[test]
    fn test_decode_charset() {
        assert_eq!(decode_charset("héllo".as_bytes(), Some("utf-8")), "héllo");
        assert_eq!(decode_charset(&[0x68, 0xE9], Some("iso-8859-1")), "hé");
        assert_eq!(decode_charset(&[0x68, 0xE9], None), "hé");
        assert_eq!(decode_charset(b"plain", Some("x-unknown")), "plain");
    }

    proptest! {
        #[test]
        fn prop_quoted_printable_round_trip(s in "\\PC*") {
            let encoded = encode_quoted_printable(&s);
            prop_assert_eq!(decode_quoted_printable(&encoded).unwrap(), s);
        }

        #[test]
        fn prop_quoted_printable_round_trip_framing(s in "[a-z=\r\n \té€]{0,300}") {
            let encoded = encode_quoted_printable(&s);
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= MAX_LINE_LENGTH);
            }
            prop_assert_eq!(decode_quoted_printable(&encoded).unwrap(), s);
        }
    }
}
