//! Sans-I/O parser for IMAP server responses.
//!
//! Input is one complete response unit as produced by the
//! [`ResponseFramer`](crate::connection::ResponseFramer): a single line, or a
//! line with its embedded literals.
//!
//! ```
//! use mailwire_imap::parser::{parse_untagged, UntaggedResponse};
//!
//! let response = parse_untagged(b"* 42 EXISTS\r\n").unwrap();
//! assert_eq!(response, UntaggedResponse::Exists(42));
//! ```

pub mod envelope;
pub mod fetch;
pub mod lexer;
pub mod value;

pub use envelope::{NO_SUBJECT, parse_address_list, parse_envelope};
pub use fetch::{FetchData, parse_fetch};
pub use lexer::{Lexer, Token};
pub use value::Value;

use crate::types::{Capability, Flag, Flags, MailboxListing, Status};
use crate::{Error, Result};

/// Bracketed response code of a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `[ALERT]`
    Alert,
    /// `[CAPABILITY ...]`
    Capability(Vec<Capability>),
    /// `[PERMANENTFLAGS (...)]`
    PermanentFlags(Flags),
    /// `[READ-ONLY]`
    ReadOnly,
    /// `[READ-WRITE]`
    ReadWrite,
    /// `[UIDNEXT n]`
    UidNext(u32),
    /// `[UIDVALIDITY n]`
    UidValidity(u32),
    /// `[UNSEEN n]`
    Unseen(u32),
    /// Any other code, verbatim.
    Other(String),
}

impl ResponseCode {
    /// Interprets the text between the brackets.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let (name, rest) = text.split_once(' ').unwrap_or((text, ""));
        let number = || rest.trim().parse::<u32>().ok();

        match name.to_ascii_uppercase().as_str() {
            "ALERT" => Self::Alert,
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "CAPABILITY" => Self::Capability(rest.split_whitespace().map(Capability::parse).collect()),
            "PERMANENTFLAGS" => Self::PermanentFlags(
                rest.trim()
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .split_whitespace()
                    .map(Flag::parse)
                    .collect(),
            ),
            "UIDNEXT" => number().map_or_else(|| Self::Other(text.to_string()), Self::UidNext),
            "UIDVALIDITY" => {
                number().map_or_else(|| Self::Other(text.to_string()), Self::UidValidity)
            }
            "UNSEEN" => number().map_or_else(|| Self::Other(text.to_string()), Self::Unseen),
            _ => Self::Other(text.to_string()),
        }
    }
}

/// The completion line of a command: `<tag> OK|NO|BAD [code] text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedStatus {
    /// Command tag.
    pub tag: String,
    /// Completion status.
    pub status: Status,
    /// Optional response code.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
}

impl TaggedStatus {
    /// Converts a non-OK status into the matching error, carrying the
    /// server's text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`], [`Error::Bad`] or [`Error::Bye`] unless the
    /// status is OK.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye => Err(Error::Bye(self.text)),
        }
    }
}

/// A parsed untagged (`* ...`) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`
    Status {
        /// Status word.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* FLAGS (...)`
    Flags(Flags),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* LIST (...) "/" name`
    List(MailboxListing),
    /// `* SEARCH n n n`
    Search(Vec<u32>),
    /// `* n FETCH (...)`
    Fetch(Box<FetchData>),
    /// Anything else, verbatim.
    Other(String),
}

/// Parses a tagged completion line.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the line lacks a tag or a status word.
pub fn parse_tagged(raw: &[u8]) -> Result<TaggedStatus> {
    let mut lexer = Lexer::new(raw);
    let Token::Atom(tag) = lexer.next_token()? else {
        return Err(lexer.error("Expected tag"));
    };
    lexer.skip_spaces();
    let (status, code, text) = read_status(&mut lexer)?;
    Ok(TaggedStatus {
        tag: tag.to_string(),
        status,
        code,
        text,
    })
}

/// Parses one untagged response unit.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the unit does not start with `* ` or a
/// recognised response has malformed data.
pub fn parse_untagged(raw: &[u8]) -> Result<UntaggedResponse> {
    let mut lexer = Lexer::new(raw);
    if lexer.next_token()? != Token::Asterisk {
        return Err(lexer.error("Expected untagged response"));
    }
    lexer.skip_spaces();

    match lexer.next_token()? {
        Token::Number(n) => {
            lexer.skip_spaces();
            let Token::Atom(kind) = lexer.next_token()? else {
                return Err(lexer.error("Expected message data keyword"));
            };
            match kind.to_ascii_uppercase().as_str() {
                "EXISTS" => Ok(UntaggedResponse::Exists(n)),
                "RECENT" => Ok(UntaggedResponse::Recent(n)),
                "EXPUNGE" => Ok(UntaggedResponse::Expunge(n)),
                "FETCH" => {
                    let value = value::read_value(&mut lexer)?;
                    Ok(UntaggedResponse::Fetch(Box::new(parse_fetch(n, &value))))
                }
                _ => Ok(UntaggedResponse::Other(lossy(raw))),
            }
        }
        Token::Atom(word) => {
            if let Some(status) = Status::parse(word) {
                lexer.skip_spaces();
                let (_, code, text) = read_status_rest(&mut lexer, status)?;
                return Ok(UntaggedResponse::Status { status, code, text });
            }
            match word.to_ascii_uppercase().as_str() {
                "CAPABILITY" => Ok(UntaggedResponse::Capability(
                    lexer
                        .read_text()
                        .split_whitespace()
                        .map(Capability::parse)
                        .collect(),
                )),
                "FLAGS" => {
                    let value = value::read_value(&mut lexer)?;
                    Ok(UntaggedResponse::Flags(flags_from(&value)))
                }
                "LIST" | "LSUB" => parse_list(&mut lexer).map(UntaggedResponse::List),
                "SEARCH" => Ok(UntaggedResponse::Search(
                    lexer
                        .read_text()
                        .split_whitespace()
                        .map_while(|n| n.parse().ok())
                        .collect(),
                )),
                _ => Ok(UntaggedResponse::Other(lossy(raw))),
            }
        }
        _ => Ok(UntaggedResponse::Other(lossy(raw))),
    }
}

fn read_status(lexer: &mut Lexer<'_>) -> Result<(Status, Option<ResponseCode>, String)> {
    let Token::Atom(word) = lexer.next_token()? else {
        return Err(lexer.error("Expected status"));
    };
    let status = Status::parse(word).ok_or_else(|| lexer.error("Unknown status"))?;
    lexer.skip_spaces();
    read_status_rest(lexer, status)
}

fn read_status_rest(
    lexer: &mut Lexer<'_>,
    status: Status,
) -> Result<(Status, Option<ResponseCode>, String)> {
    let code = if lexer.peek() == Some(b'[') {
        lexer.next_token()?;
        let code = ResponseCode::parse(lexer.read_section()?);
        lexer.skip_spaces();
        Some(code)
    } else {
        None
    };
    Ok((status, code, lexer.read_text()))
}

fn parse_list(lexer: &mut Lexer<'_>) -> Result<MailboxListing> {
    let attributes = value::read_value(lexer)?;
    let delimiter = value::read_value(lexer)?;
    let name = value::read_value(lexer)?;

    Ok(MailboxListing {
        name: name
            .as_text()
            .ok_or_else(|| lexer.error("Expected mailbox name"))?,
        delimiter: delimiter.as_text(),
        attributes: attributes
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_text)
            .collect(),
    })
}

fn flags_from(value: &Value<'_>) -> Flags {
    value
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_text)
        .map(|f| Flag::parse(&f))
        .collect()
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_string()
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
    fn test_tagged_ok() {
        let status = parse_tagged(b"A0001 OK [READ-WRITE] SELECT completed\r\n").unwrap();
        assert_eq!(status.tag, "A0001");
        assert_eq!(status.status, Status::Ok);
        assert_eq!(status.code, Some(ResponseCode::ReadWrite));
        assert_eq!(status.text, "SELECT completed");
        assert!(status.into_result().is_ok());
    }

    #[test]
    fn test_tagged_no_carries_text() {
        let status = parse_tagged(b"A0003 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .unwrap();
        assert_eq!(
            status.code,
            Some(ResponseCode::Other("AUTHENTICATIONFAILED".to_string()))
        );
        match status.into_result() {
            Err(Error::No(text)) => assert_eq!(text, "Invalid credentials"),
            other => panic!("expected NO, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_bad() {
        let status = parse_tagged(b"A0002 BAD Unknown command\r\n").unwrap();
        assert!(matches!(status.into_result(), Err(Error::Bad(t)) if t == "Unknown command"));
    }

    #[test]
    fn test_tagged_garbage() {
        assert!(parse_tagged(b"A0001 MAYBE\r\n").is_err());
        assert!(parse_tagged(b"\r\n").is_err());
    }

    #[test]
    fn test_untagged_status_codes() {
        let cases: [(&[u8], ResponseCode); 5] = [
            (b"* OK [UIDVALIDITY 7] UIDs valid\r\n", ResponseCode::UidValidity(7)),
            (b"* OK [UIDNEXT 4392] Predicted next UID\r\n", ResponseCode::UidNext(4392)),
            (b"* OK [UNSEEN 12] first unseen\r\n", ResponseCode::Unseen(12)),
            (b"* OK [READ-ONLY] Examined\r\n", ResponseCode::ReadOnly),
            (b"* NO [ALERT] disk full\r\n", ResponseCode::Alert),
        ];
        for (raw, expected) in cases {
            match parse_untagged(raw).unwrap() {
                UntaggedResponse::Status { code, .. } => assert_eq!(code, Some(expected)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_permanent_flags() {
        match parse_untagged(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n").unwrap()
        {
            UntaggedResponse::Status {
                code: Some(ResponseCode::PermanentFlags(flags)),
                ..
            } => {
                assert!(flags.is_deleted());
                assert!(flags.is_seen());
                assert_eq!(flags.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_greeting_with_capabilities() {
        match parse_untagged(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] ready\r\n").unwrap() {
            UntaggedResponse::Status {
                status: Status::Ok,
                code: Some(ResponseCode::Capability(caps)),
                text,
            } => {
                assert!(caps.contains(&Capability::StartTls));
                assert_eq!(text, "ready");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_message_counts() {
        assert_eq!(
            parse_untagged(b"* 42 EXISTS\r\n").unwrap(),
            UntaggedResponse::Exists(42)
        );
        assert_eq!(
            parse_untagged(b"* 3 RECENT\r\n").unwrap(),
            UntaggedResponse::Recent(3)
        );
        assert_eq!(
            parse_untagged(b"* 5 EXPUNGE\r\n").unwrap(),
            UntaggedResponse::Expunge(5)
        );
    }

    #[test]
    fn test_capability() {
        let response = parse_untagged(b"* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN\r\n").unwrap();
        assert_eq!(
            response,
            UntaggedResponse::Capability(vec![
                Capability::Imap4Rev1,
                Capability::StartTls,
                Capability::Auth("PLAIN".to_string()),
            ])
        );
    }

    #[test]
    fn test_flags() {
        match parse_untagged(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n").unwrap() {
            UntaggedResponse::Flags(flags) => assert_eq!(flags.len(), 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_list() {
        let response = parse_untagged(b"* LIST (\\HasNoChildren) \"/\" \"Sent Items\"\r\n").unwrap();
        assert_eq!(
            response,
            UntaggedResponse::List(MailboxListing {
                name: "Sent Items".to_string(),
                delimiter: Some("/".to_string()),
                attributes: vec!["\\HasNoChildren".to_string()],
            })
        );

        match parse_untagged(b"* LIST () NIL INBOX\r\n").unwrap() {
            UntaggedResponse::List(listing) => {
                assert_eq!(listing.name, "INBOX");
                assert_eq!(listing.delimiter, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_list_literal_name() {
        match parse_untagged(b"* LIST () \".\" {8}\r\nWeird\"Nm\r\n").unwrap() {
            UntaggedResponse::List(listing) => assert_eq!(listing.name, "Weird\"Nm"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_search() {
        assert_eq!(
            parse_untagged(b"* SEARCH 2 84 882\r\n").unwrap(),
            UntaggedResponse::Search(vec![2, 84, 882])
        );
        assert_eq!(
            parse_untagged(b"* SEARCH\r\n").unwrap(),
            UntaggedResponse::Search(vec![])
        );
    }

    #[test]
    fn test_fetch() {
        let raw = b"* 12 FETCH (UID 100 FLAGS (\\Seen) BODY[TEXT] {5}\r\nhi\r\n!)\r\n";
        match parse_untagged(raw).unwrap() {
            UntaggedResponse::Fetch(data) => {
                assert_eq!(data.seq, 12);
                assert_eq!(data.uid, Some(100));
                assert_eq!(data.section("BODY[TEXT]"), Some(&b"hi\r\n!"[..]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other() {
        assert!(matches!(
            parse_untagged(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n").unwrap(),
            UntaggedResponse::Other(_)
        ));
        assert!(parse_untagged(b"A0001 OK\r\n").is_err());
    }

    #[test]
    fn test_huge_literal_is_an_error() {
        let raw = b"* 1 FETCH (BODY[TEXT] {18446744073709551615}\r\nhi)\r\n";
        assert!(parse_untagged(raw).is_err());
    }
}
