//! Command serialization helpers.

use super::types::{FetchAttribute, SearchCriteria, StoreAction};

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        write_quoted(buf, s);
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Writes a quoted string, escaping `"` and `\`. CR and LF cannot appear in
/// a quoted string and are dropped.
pub fn write_quoted(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for b in s.bytes() {
        match b {
            b'"' | b'\\' => {
                buf.push(b'\\');
                buf.push(b);
            }
            b'\r' | b'\n' => {}
            _ => buf.push(b),
        }
    }
    buf.push(b'"');
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

/// Writes FETCH items; a single item goes unparenthesized.
pub fn write_fetch_items(buf: &mut Vec<u8>, attrs: &[FetchAttribute]) {
    if let [attr] = attrs {
        write_fetch_attribute(buf, attr);
        return;
    }
    buf.push(b'(');
    for (i, attr) in attrs.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        write_fetch_attribute(buf, attr);
    }
    buf.push(b')');
}

/// Writes a single FETCH attribute.
pub fn write_fetch_attribute(buf: &mut Vec<u8>, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Uid => buf.extend_from_slice(b"UID"),
        FetchAttribute::Flags => buf.extend_from_slice(b"FLAGS"),
        FetchAttribute::InternalDate => buf.extend_from_slice(b"INTERNALDATE"),
        FetchAttribute::Rfc822Size => buf.extend_from_slice(b"RFC822.SIZE"),
        FetchAttribute::Envelope => buf.extend_from_slice(b"ENVELOPE"),
        FetchAttribute::Body { section, peek } => {
            if *peek {
                buf.extend_from_slice(b"BODY.PEEK[");
            } else {
                buf.extend_from_slice(b"BODY[");
            }
            if let Some(s) = section {
                buf.extend_from_slice(s.as_bytes());
            }
            buf.push(b']');
        }
    }
}

/// Writes STORE action.
pub fn write_store_action(buf: &mut Vec<u8>, action: &StoreAction) {
    let (prefix, flags) = match action {
        StoreAction::SetFlags(f) => ("FLAGS", f),
        StoreAction::AddFlags(f) => ("+FLAGS", f),
        StoreAction::RemoveFlags(f) => ("-FLAGS", f),
    };
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(b" (");
    for (i, flag) in flags.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        buf.extend_from_slice(flag.as_str().as_bytes());
    }
    buf.push(b')');
}

/// Writes SEARCH criteria. String arguments are always quoted.
pub fn write_search_criteria(buf: &mut Vec<u8>, criteria: &SearchCriteria) {
    match criteria {
        SearchCriteria::All => buf.extend_from_slice(b"ALL"),
        SearchCriteria::Flagged => buf.extend_from_slice(b"FLAGGED"),
        SearchCriteria::Unseen => buf.extend_from_slice(b"UNSEEN"),
        SearchCriteria::Seen => buf.extend_from_slice(b"SEEN"),
        SearchCriteria::Subject(s) => {
            buf.extend_from_slice(b"SUBJECT ");
            write_quoted(buf, s);
        }
        SearchCriteria::From(s) => {
            buf.extend_from_slice(b"FROM ");
            write_quoted(buf, s);
        }
        SearchCriteria::To(s) => {
            buf.extend_from_slice(b"TO ");
            write_quoted(buf, s);
        }
        SearchCriteria::Text(s) => {
            buf.extend_from_slice(b"TEXT ");
            write_quoted(buf, s);
        }
        SearchCriteria::And(items) => {
            buf.push(b'(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                write_search_criteria(buf, item);
            }
            buf.push(b')');
        }
        SearchCriteria::Or(a, b) => {
            buf.extend_from_slice(b"OR ");
            write_search_criteria(buf, a);
            buf.push(b' ');
            write_search_criteria(buf, b);
        }
        SearchCriteria::Not(c) => {
            buf.extend_from_slice(b"NOT ");
            write_search_criteria(buf, c);
        }
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

    fn astring(s: &str) -> String {
        let mut buf = Vec::new();
        write_astring(&mut buf, s);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_astring_atom() {
        assert_eq!(astring("INBOX"), "INBOX");
        assert_eq!(astring("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_astring_quoted() {
        assert_eq!(astring(""), "\"\"");
        assert_eq!(astring("Sent Items"), "\"Sent Items\"");
        assert_eq!(astring(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn test_quoted_drops_line_breaks() {
        let mut buf = Vec::new();
        write_quoted(&mut buf, "a\r\nb");
        assert_eq!(buf, b"\"ab\"");
    }

    #[test]
    fn test_search_or_tree() {
        let criteria =
            SearchCriteria::to_any(["a@x.com", "b@x.com", "c@x.com"]).unwrap();
        let mut buf = Vec::new();
        write_search_criteria(&mut buf, &criteria);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            r#"OR TO "a@x.com" OR TO "b@x.com" TO "c@x.com""#
        );
    }

    #[test]
    fn test_search_single_recipient() {
        let criteria = SearchCriteria::to_any(["a@x.com"]).unwrap();
        assert_eq!(criteria, SearchCriteria::To("a@x.com".to_string()));
        assert_eq!(SearchCriteria::to_any(Vec::<String>::new()), None);
    }

    #[test]
    fn test_search_subject_or_from() {
        let mut buf = Vec::new();
        write_search_criteria(&mut buf, &SearchCriteria::subject_or_from("invoice \"Q3\""));
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            r#"OR SUBJECT "invoice \"Q3\"" FROM "invoice \"Q3\"""#
        );
    }

    #[test]
    fn test_fetch_items() {
        let mut buf = Vec::new();
        write_fetch_items(&mut buf, &FetchAttribute::body());
        assert_eq!(buf, b"(UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])");

        let mut buf = Vec::new();
        write_fetch_items(&mut buf, &[FetchAttribute::Envelope]);
        assert_eq!(buf, b"ENVELOPE");
    }
}
