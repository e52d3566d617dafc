//! FETCH response data.

use super::envelope::{malformed_envelope, parse_envelope};
use super::value::Value;
use crate::types::{EmailEnvelope, EmailHeader, Flag, Flags};

/// The attributes returned for one message by FETCH or UID FETCH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// Message sequence number.
    pub seq: u32,
    /// `UID`.
    pub uid: Option<u32>,
    /// `FLAGS`.
    pub flags: Option<Flags>,
    /// `RFC822.SIZE`.
    pub size: Option<u32>,
    /// `INTERNALDATE`, verbatim.
    pub internal_date: Option<String>,
    /// `ENVELOPE`.
    pub envelope: Option<EmailEnvelope>,
    /// Body sections keyed by their upper-cased item name
    /// (`BODY[HEADER]`, `BODY[TEXT]`, ...). `None` when the server sent NIL.
    pub sections: Vec<(String, Option<Vec<u8>>)>,
}

impl FetchData {
    /// Returns a body section's payload by item name, case-insensitively.
    /// `BODY.PEEK[...]` and `BODY[...]` name the same section.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&[u8]> {
        let wanted = name.to_ascii_uppercase().replace("BODY.PEEK[", "BODY[");
        self.sections
            .iter()
            .find(|(key, _)| *key == wanted)
            .and_then(|(_, data)| data.as_deref())
    }

    /// Converts a summary fetch into a listing entry; `None` without a UID.
    #[must_use]
    pub fn into_header(self) -> Option<EmailHeader> {
        Some(EmailHeader {
            uid: self.uid?,
            flags: self.flags.unwrap_or_default(),
            envelope: self.envelope.unwrap_or_else(malformed_envelope),
            size: self.size.unwrap_or(0),
        })
    }
}

/// Interprets the parenthesized attribute list of `* n FETCH (...)`.
///
/// Unknown attributes are skipped; an unreadable ENVELOPE degrades to a
/// placeholder rather than failing the whole message.
#[must_use]
pub fn parse_fetch(seq: u32, value: &Value<'_>) -> FetchData {
    let mut data = FetchData {
        seq,
        ..FetchData::default()
    };
    let Some(items) = value.as_list() else {
        return data;
    };

    for pair in items.chunks(2) {
        let [key, value] = pair else {
            break;
        };
        let Value::Atom(key) = key else {
            continue;
        };
        let key = key.to_ascii_uppercase();

        match key.as_str() {
            "UID" => data.uid = value.as_number(),
            "RFC822.SIZE" => data.size = value.as_number(),
            "INTERNALDATE" => data.internal_date = value.as_text(),
            "FLAGS" => {
                data.flags = value.as_list().map(|flags| {
                    flags
                        .iter()
                        .filter_map(Value::as_text)
                        .map(|f| Flag::parse(&f))
                        .collect()
                });
            }
            "ENVELOPE" => {
                data.envelope = Some(if value.as_list().is_some() {
                    parse_envelope(value)
                } else {
                    malformed_envelope()
                });
            }
            _ if key.starts_with("BODY[") || key.starts_with("RFC822") => {
                let name = normalize_section(&key);
                data.sections
                    .push((name, value.as_bytes().map(<[u8]>::to_vec)));
            }
            _ => {}
        }
    }

    data
}

/// Drops a `<origin>` partial suffix; `RFC822.HEADER` and `RFC822.TEXT`
/// map to their `BODY[...]` equivalents.
fn normalize_section(key: &str) -> String {
    let key = key.split('<').next().unwrap_or(key);
    match key {
        "RFC822" => "BODY[]".to_string(),
        "RFC822.HEADER" => "BODY[HEADER]".to_string(),
        "RFC822.TEXT" => "BODY[TEXT]".to_string(),
        other => other.to_string(),
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
    use crate::parser::lexer::Lexer;
    use crate::parser::value::read_value;

    fn fetch(input: &str) -> FetchData {
        let mut lexer = Lexer::new(input.as_bytes());
        parse_fetch(1, &read_value(&mut lexer).unwrap())
    }

    #[test]
    fn test_summary_items() {
        let data = fetch(concat!(
            "(UID 42 FLAGS (\\Seen $Work) RFC822.SIZE 3172 ",
            "INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" ",
            "ENVELOPE (NIL \"Hello World\" NIL NIL NIL NIL NIL NIL NIL NIL))"
        ));
        assert_eq!(data.seq, 1);
        assert_eq!(data.uid, Some(42));
        assert_eq!(data.size, Some(3172));
        let flags = data.flags.unwrap();
        assert!(flags.is_seen());
        assert!(flags.contains(&Flag::Keyword("$Work".to_string())));
        assert_eq!(
            data.internal_date.as_deref(),
            Some("17-Jul-1996 02:44:25 -0700")
        );
        let envelope = data.envelope.unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("Hello World"));
        assert_eq!(envelope.cc, None);
    }

    #[test]
    fn test_body_sections() {
        let data = fetch(concat!(
            "(UID 7 BODY[HEADER] {15}\r\nSubject: hi\r\n\r\n ",
            "BODY[TEXT] {4}\r\nbody)"
        ));
        assert_eq!(data.uid, Some(7));
        assert_eq!(data.section("BODY[HEADER]"), Some(&b"Subject: hi\r\n\r\n"[..]));
        assert_eq!(data.section("body.peek[text]"), Some(&b"body"[..]));
        assert_eq!(data.section("BODY[]"), None);
    }

    #[test]
    fn test_nil_section_and_partial() {
        let data = fetch("(BODY[TEXT] NIL BODY[]<0> \"abc\" RFC822.HEADER \"h\")");
        assert_eq!(data.section("BODY[TEXT]"), None);
        assert_eq!(data.sections[0], ("BODY[TEXT]".to_string(), None));
        assert_eq!(data.section("BODY[]"), Some(&b"abc"[..]));
        assert_eq!(data.section("BODY[HEADER]"), Some(&b"h"[..]));
    }

    #[test]
    fn test_malformed_envelope_placeholder() {
        let data = fetch("(UID 3 ENVELOPE NIL)");
        assert_eq!(
            data.envelope.unwrap().subject.as_deref(),
            Some(crate::parser::envelope::NO_SUBJECT)
        );
    }

    #[test]
    fn test_unknown_items_skipped() {
        let data = fetch("(MODSEQ (12345) UID 9 X-GM-LABELS (\\Inbox))");
        assert_eq!(data.uid, Some(9));
    }

    #[test]
    fn test_into_header() {
        let header = fetch("(UID 12 RFC822.SIZE 99 FLAGS (\\Flagged))")
            .into_header()
            .unwrap();
        assert_eq!(header.uid, 12);
        assert_eq!(header.size, 99);
        assert!(header.flags.is_flagged());
        assert_eq!(header.envelope.subject.as_deref(), Some(crate::parser::envelope::NO_SUBJECT));

        assert!(fetch("(FLAGS ())").into_header().is_none());
    }
}
