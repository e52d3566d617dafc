//! ENVELOPE and address-list interpretation.
//!
//! Interpretation never fails: NIL or malformed fields become `None` (the
//! subject becomes [`NO_SUBJECT`]), and address entries missing either the
//! mailbox or the host are dropped.

use mailwire_mime::encoded_word::decode_words;

use super::value::Value;
use crate::types::{EmailAddress, EmailEnvelope};

/// Subject used when the envelope has none or could not be read at all.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Interprets an ENVELOPE 10-tuple: date, subject, from, sender, reply-to,
/// to, cc, bcc, in-reply-to, message-id.
#[must_use]
pub fn parse_envelope(value: &Value<'_>) -> EmailEnvelope {
    let Some(fields) = value.as_list() else {
        return malformed_envelope();
    };
    let field = |i: usize| fields.get(i);

    EmailEnvelope {
        date: field(0).and_then(Value::as_text),
        subject: Some(
            field(1)
                .and_then(Value::as_text)
                .map_or_else(|| NO_SUBJECT.to_string(), |s| decode_words(&s)),
        ),
        from: field(2).and_then(parse_address_list),
        sender: field(3).and_then(parse_address_list),
        reply_to: field(4).and_then(parse_address_list),
        to: field(5).and_then(parse_address_list),
        cc: field(6).and_then(parse_address_list),
        bcc: field(7).and_then(parse_address_list),
        in_reply_to: field(8).and_then(Value::as_text),
        message_id: field(9).and_then(Value::as_text),
    }
}

/// Envelope substituted when the server's ENVELOPE is unreadable.
#[must_use]
pub fn malformed_envelope() -> EmailEnvelope {
    EmailEnvelope {
        subject: Some(NO_SUBJECT.to_string()),
        ..EmailEnvelope::default()
    }
}

/// Interprets an address list. `NIL` yields `None`.
#[must_use]
pub fn parse_address_list(value: &Value<'_>) -> Option<Vec<EmailAddress>> {
    let entries = value.as_list()?;
    Some(entries.iter().filter_map(parse_address).collect())
}

/// Interprets one `(name adl mailbox host)` entry.
fn parse_address(value: &Value<'_>) -> Option<EmailAddress> {
    let parts = value.as_list()?;
    let mailbox = parts.get(2).and_then(Value::as_text).filter(|s| !s.is_empty())?;
    let host = parts.get(3).and_then(Value::as_text).filter(|s| !s.is_empty())?;
    let name = parts
        .first()
        .and_then(Value::as_text)
        .map(|n| decode_words(&n))
        .unwrap_or_default();

    Some(EmailAddress {
        name,
        email: format!("{mailbox}@{host}"),
    })
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

    fn envelope(input: &str) -> EmailEnvelope {
        let mut lexer = Lexer::new(input.as_bytes());
        parse_envelope(&read_value(&mut lexer).unwrap())
    }

    #[test]
    fn test_full_envelope() {
        let env = envelope(concat!(
            "(\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Hello World\" ",
            "((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) ",
            "((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) ",
            "NIL ",
            "((NIL NIL \"imap\" \"cac.washington.edu\")) ",
            "NIL NIL NIL \"<B27397-0100000@cac.washington.edu>\")"
        ));

        assert_eq!(env.date.as_deref(), Some("Mon, 7 Feb 1994 21:52:25 -0800"));
        assert_eq!(env.subject.as_deref(), Some("Hello World"));
        let from = env.from.unwrap();
        assert_eq!(from[0].name, "Terry Gray");
        assert_eq!(from[0].email, "gray@cac.washington.edu");
        assert_eq!(env.reply_to, None);
        let to = env.to.unwrap();
        assert_eq!(to[0].name, "");
        assert_eq!(to[0].email, "imap@cac.washington.edu");
        assert_eq!(env.cc, None);
        assert_eq!(env.bcc, None);
        assert_eq!(env.in_reply_to, None);
        assert_eq!(
            env.message_id.as_deref(),
            Some("<B27397-0100000@cac.washington.edu>")
        );
    }

    #[test]
    fn test_all_nil() {
        let env = envelope("(NIL NIL NIL NIL NIL NIL NIL NIL NIL NIL)");
        assert_eq!(env, malformed_envelope());
        assert_eq!(env.subject.as_deref(), Some(NO_SUBJECT));
        assert_eq!(env.from, None);
    }

    #[test]
    fn test_encoded_subject_and_name() {
        let env = envelope(concat!(
            "(NIL \"=?UTF-8?B?UsOpc3Vtw6k=?=\" ",
            "((\"=?ISO-8859-1?Q?Keld_J=F8rn?=\" NIL \"keld\" \"dkuug.dk\")) ",
            "NIL NIL NIL NIL NIL NIL NIL)"
        ));
        assert_eq!(env.subject.as_deref(), Some("Résumé"));
        assert_eq!(env.from.unwrap()[0].name, "Keld Jørn");
    }

    #[test]
    fn test_subject_with_parens_and_quotes() {
        let env = envelope(r#"(NIL "Re: (urgent) \"quoted\"" NIL NIL NIL NIL NIL NIL NIL NIL)"#);
        assert_eq!(env.subject.as_deref(), Some("Re: (urgent) \"quoted\""));
    }

    #[test]
    fn test_literal_subject() {
        let env = envelope("(NIL {11}\r\nline\r\nbreak NIL NIL NIL NIL NIL NIL NIL NIL)");
        assert_eq!(env.subject.as_deref(), Some("line\r\nbreak"));
    }

    #[test]
    fn test_incomplete_addresses_dropped() {
        let env = envelope(concat!(
            "(NIL NIL NIL NIL NIL ",
            "((NIL NIL \"undisclosed-recipients\" NIL) (NIL NIL NIL NIL) (\"Ok\" NIL \"ok\" \"x.com\")) ",
            "() NIL NIL NIL)"
        ));
        let to = env.to.unwrap();
        assert_eq!(to.len(), 1);
        assert_eq!(to[0].email, "ok@x.com");
        assert_eq!(env.cc, Some(vec![]));
    }

    #[test]
    fn test_short_and_malformed() {
        let env = envelope("(\"date only\")");
        assert_eq!(env.date.as_deref(), Some("date only"));
        assert_eq!(env.subject.as_deref(), Some(NO_SUBJECT));

        let env = parse_envelope(&Value::Nil);
        assert_eq!(env.subject.as_deref(), Some(NO_SUBJECT));
    }

    #[test]
    fn test_address_list_garbage_entries() {
        let list = Value::List(vec![
            Value::Atom("junk".to_string()),
            Value::List(vec![Value::Nil]),
        ]);
        assert_eq!(parse_address_list(&list), Some(vec![]));
        assert_eq!(parse_address_list(&Value::Nil), None);
    }
}
