//! Fetched message body parsing.
//!
//! Takes the `BODY[HEADER]` and `BODY[TEXT]` payloads of a message and
//! extracts the first `text/plain` and the first `text/html` rendition found
//! anywhere in the MIME tree.

use std::collections::HashMap;
use std::fmt;

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable_bytes};
use crate::header::Headers;

/// Multipart nesting deeper than this is ignored.
pub const MAX_MULTIPART_DEPTH: usize = 16;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Decodes `body` and converts it to text in `charset`.
    ///
    /// Undecodable Base64 or Quoted-Printable input is returned as-is.
    #[must_use]
    pub fn decode_text(self, body: &[u8], charset: Option<&str>) -> String {
        let decoded = match self {
            Self::Base64 => decode_base64(&String::from_utf8_lossy(body)),
            Self::QuotedPrintable => decode_quoted_printable_bytes(body),
            Self::SevenBit | Self::EightBit | Self::Binary => {
                return decode_charset(body, charset);
            }
        };

        match decoded {
            Ok(bytes) => decode_charset(&bytes, charset),
            Err(e) => {
                tracing::debug!(encoding = %self, error = %e, "keeping undecodable body part raw");
                decode_charset(body, charset)
            }
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Text renditions and top-level headers of a fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyParts {
    /// First `text/plain` part, decoded.
    pub text: Option<String>,
    /// First `text/html` part, decoded.
    pub html: Option<String>,
    /// Top-level headers with lower-cased names.
    pub headers: HashMap<String, String>,
}

/// Parses a message from its header block and body text.
///
/// Never fails: malformed structure yields whatever renditions could be
/// recovered.
#[must_use]
pub fn parse_body(header: &[u8], text: &[u8]) -> BodyParts {
    let headers = Headers::parse_bytes(header);
    let mut parts = BodyParts::default();
    collect_part(&headers, text, 0, &mut parts);
    parts.headers = headers.into_map();
    parts
}

fn collect_part(headers: &Headers, body: &[u8], depth: usize, out: &mut BodyParts) {
    let content_type = headers
        .get("content-type")
        .and_then(|v| ContentType::parse(v).ok())
        .unwrap_or_else(ContentType::text_plain);

    if content_type.is_multipart()
        && let Some(boundary) = content_type.boundary()
    {
        if depth >= MAX_MULTIPART_DEPTH {
            tracing::warn!(depth, "multipart nesting too deep, skipping subtree");
            return;
        }
        for part in split_multipart(body, boundary) {
            let (part_header, part_body) = split_header_block(part);
            let part_headers = Headers::parse_bytes(part_header);
            collect_part(&part_headers, part_body, depth + 1, out);
            if out.text.is_some() && out.html.is_some() {
                return;
            }
        }
        return;
    }

    let is_html = content_type.is("text", "html");
    let is_plain = content_type.is("text", "plain");
    // A single-part message is shown as text whatever it claims to be.
    let wanted = if is_html {
        out.html.is_none()
    } else {
        (is_plain || depth == 0) && out.text.is_none()
    };
    if !wanted {
        return;
    }

    let encoding = headers
        .get("content-transfer-encoding")
        .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
    let decoded = encoding.decode_text(body, content_type.charset());

    if is_html {
        out.html = Some(decoded);
    } else {
        out.text = Some(decoded);
    }
}

/// Splits a multipart body into its parts.
///
/// The preamble before the first delimiter and the epilogue after the
/// closing delimiter are dropped. The line break preceding a delimiter
/// belongs to the delimiter, not to the part.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i + 1);
        let line = body[pos..line_end].trim_ascii_end();

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = part_start.take() {
                    parts.push(strip_line_break(&body[start..pos]));
                }
                if closing {
                    return parts;
                }
                part_start = Some(line_end);
            }
        }
        pos = line_end;
    }

    // Unterminated multipart: keep what we have.
    if let Some(start) = part_start
        && start < body.len()
    {
        parts.push(&body[start..]);
    }
    parts
}

/// Splits a part into its header block and body at the first empty line.
fn split_header_block(part: &[u8]) -> (&[u8], &[u8]) {
    if part.starts_with(b"\r\n") {
        return (&[], &part[2..]);
    }
    if part.starts_with(b"\n") {
        return (&[], &part[1..]);
    }
    if let Some(i) = find(part, b"\r\n\r\n") {
        return (&part[..i + 2], &part[i + 4..]);
    }
    if let Some(i) = find(part, b"\n\n") {
        return (&part[..i + 1], &part[i + 2..]);
    }
    (&[], part)
}

fn strip_line_break(s: &[u8]) -> &[u8] {
    s.strip_suffix(b"\r\n")
        .or_else(|| s.strip_suffix(b"\n"))
        .unwrap_or(s)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
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

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_single_part_plain() {
        let body = parse_body(b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\n", b"Hello");
        assert_eq!(body.text.as_deref(), Some("Hello"));
        assert_eq!(body.html, None);
        assert_eq!(body.headers.get("subject").map(String::as_str), Some("Hi"));
    }

    #[test]
    fn test_single_part_without_content_type() {
        let body = parse_body(b"Subject: Hi\r\n\r\n", b"Just text\r\n");
        assert_eq!(body.text.as_deref(), Some("Just text\r\n"));
    }

    #[test]
    fn test_single_part_html_quoted_printable() {
        let header = b"Content-Type: text/html; charset=utf-8\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\n";
        let body = parse_body(header, b"<p>Caf=C3=A9 =\r\nau lait</p>");
        assert_eq!(body.html.as_deref(), Some("<p>Café au lait</p>"));
        assert_eq!(body.text, None);
    }

    #[test]
    fn test_single_part_base64() {
        let header = b"Content-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\n";
        let body = parse_body(header, b"SGVsbG8s\r\nIFdvcmxkIQ==\r\n");
        assert_eq!(body.text.as_deref(), Some("Hello, World!"));
    }

    #[test]
    fn test_bad_base64_kept_raw() {
        let header = b"Content-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\n";
        let body = parse_body(header, b"not base64 at all!");
        assert_eq!(body.text.as_deref(), Some("not base64 at all!"));
    }

    #[test]
    fn test_latin1_charset() {
        let header = b"Content-Type: text/plain; charset=iso-8859-1\r\n\r\n";
        let body = parse_body(header, &[b'c', b'a', b'f', 0xE9]);
        assert_eq!(body.text.as_deref(), Some("café"));
    }

    #[test]
    fn test_alternative_html_first() {
        let header = b"Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\r\n";
        let text = concat!(
            "This is a MIME preamble\r\n",
            "--XYZ\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<b>bold</b>\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "bold\r\n",
            "--XYZ--\r\n",
            "epilogue\r\n"
        );
        let body = parse_body(header, text.as_bytes());
        assert_eq!(body.text.as_deref(), Some("bold"));
        assert_eq!(body.html.as_deref(), Some("<b>bold</b>"));
    }

    #[test]
    fn test_nested_mixed_alternative() {
        let header = b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n";
        let text = concat!(
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "R=C3=A9sum=C3=A9\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "PHA+SGk8L3A+\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=notes.txt\r\n",
            "\r\n",
            "attachment text\r\n",
            "--outer--\r\n"
        );
        let body = parse_body(header, text.as_bytes());
        assert_eq!(body.text.as_deref(), Some("Résumé"));
        assert_eq!(body.html.as_deref(), Some("<p>Hi</p>"));
    }

    #[test]
    fn test_first_part_wins() {
        let header = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n";
        let text = "--b\r\nContent-Type: text/plain\r\n\r\nfirst\r\n--b\r\nContent-Type: text/plain\r\n\r\nsecond\r\n--b--\r\n";
        let body = parse_body(header, text.as_bytes());
        assert_eq!(body.text.as_deref(), Some("first"));
    }

    #[test]
    fn test_nested_part_ignores_non_text() {
        let header = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n";
        let text = "--b\r\nContent-Type: image/png\r\nContent-Transfer-Encoding: base64\r\n\r\niVBORw0KGgo=\r\n--b--\r\n";
        let body = parse_body(header, text.as_bytes());
        assert_eq!(body.text, None);
        assert_eq!(body.html, None);
    }

    #[test]
    fn test_unterminated_multipart() {
        let header = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n";
        let text = "--b\r\nContent-Type: text/plain\r\n\r\ndangling";
        let body = parse_body(header, text.as_bytes());
        assert_eq!(body.text.as_deref(), Some("dangling"));
    }

    fn nested(levels: usize) -> String {
        let mut text =
            format!("--b{levels}\r\nContent-Type: text/plain\r\n\r\ndeep\r\n--b{levels}--\r\n");
        for level in (0..levels).rev() {
            text = format!(
                "--b{level}\r\nContent-Type: multipart/mixed; boundary=b{}\r\n\r\n{text}--b{level}--\r\n",
                level + 1
            );
        }
        text
    }

    #[test]
    fn test_depth_bound() {
        let header = b"Content-Type: multipart/mixed; boundary=b0\r\n\r\n";

        let shallow = parse_body(header, nested(3).as_bytes());
        assert_eq!(shallow.text.as_deref(), Some("deep"));

        let deep = parse_body(header, nested(MAX_MULTIPART_DEPTH + 4).as_bytes());
        assert_eq!(deep.text, None);
    }

    #[test]
    fn test_multipart_lf_only() {
        let header = b"Content-Type: multipart/alternative; boundary=b\n\n";
        let text = "--b\nContent-Type: text/plain\n\nunix\n--b\nContent-Type: text/html\n\n<i>unix</i>\n--b--\n";
        let body = parse_body(header, text.as_bytes());
        assert_eq!(body.text.as_deref(), Some("unix"));
        assert_eq!(body.html.as_deref(), Some("<i>unix</i>"));
    }
}
