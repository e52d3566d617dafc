//! IMAP command builder.
//!
//! This module provides types and serialization for IMAP commands.

mod serialize;
mod tag_generator;
mod types;

use crate::types::SequenceSet;

pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, SearchCriteria, StoreAction};

use serialize::{
    write_astring, write_fetch_items, write_quoted, write_search_criteria, write_store_action,
};

/// IMAP command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    // Any State Commands
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,

    // Not Authenticated State Commands
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },

    // Authenticated State Commands
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },

    // Selected State Commands
    /// EXPUNGE command.
    Expunge,
    /// SEARCH command.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
        /// Use UIDs.
        uid: bool,
    },
    /// FETCH command.
    Fetch {
        /// Sequence set.
        sequence: SequenceSet,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
        /// Use UIDs.
        uid: bool,
    },
    /// STORE command.
    Store {
        /// Sequence set.
        sequence: SequenceSet,
        /// Store action.
        action: StoreAction,
        /// Use UIDs.
        uid: bool,
    },
}

impl Command {
    /// Serializes the command to bytes with the given tag, CRLF included.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_quoted(&mut buf, username);
                buf.push(b' ');
                write_quoted(&mut buf, password);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_quoted(&mut buf, reference);
                buf.push(b' ');
                write_quoted(&mut buf, pattern);
            }

            Self::Search { criteria, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::Fetch {
                sequence,
                items,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }

            Self::Store {
                sequence,
                action,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"STORE ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Command name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::List { .. } => "LIST",
            Self::Expunge => "EXPUNGE",
            Self::Search { uid: true, .. } => "UID SEARCH",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { uid: true, .. } => "UID FETCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { uid: true, .. } => "UID STORE",
            Self::Store { .. } => "STORE",
        }
    }
}

/// Renders the wire form of the command, except that LOGIN credentials are
/// replaced so the command can be logged.
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Self::Login { username, .. } = self {
            return write!(f, "LOGIN {username:?} <redacted>");
        }
        let wire = self.serialize("");
        let text = String::from_utf8_lossy(&wire);
        f.write_str(text.trim())
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
    use crate::types::Flag;

    fn wire(cmd: &Command, tag: &str) -> String {
        String::from_utf8(cmd.serialize(tag)).unwrap()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(wire(&Command::Capability, "A0001"), "A0001 CAPABILITY\r\n");
        assert_eq!(wire(&Command::StartTls, "A0002"), "A0002 STARTTLS\r\n");
        assert_eq!(wire(&Command::Expunge, "A0003"), "A0003 EXPUNGE\r\n");
        assert_eq!(wire(&Command::Logout, "A0004"), "A0004 LOGOUT\r\n");
        assert_eq!(wire(&Command::Noop, "A0005"), "A0005 NOOP\r\n");
    }

    #[test]
    fn test_login_escapes() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: r#"p"a\ss"#.to_string(),
        };
        assert_eq!(
            wire(&cmd, "A0001"),
            "A0001 LOGIN \"user@example.com\" \"p\\\"a\\\\ss\"\r\n"
        );
    }

    #[test]
    fn test_login_debug_redacted() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{cmd:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("user"));
    }

    #[test]
    fn test_select_and_list() {
        let cmd = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(wire(&cmd, "A0002"), "A0002 SELECT INBOX\r\n");

        let cmd = Command::Select {
            mailbox: "Sent Items".to_string(),
        };
        assert_eq!(wire(&cmd, "A0002"), "A0002 SELECT \"Sent Items\"\r\n");

        let cmd = Command::List {
            reference: String::new(),
            pattern: "*".to_string(),
        };
        assert_eq!(wire(&cmd, "A0003"), "A0003 LIST \"\" \"*\"\r\n");
    }

    #[test]
    fn test_uid_search() {
        let cmd = Command::Search {
            criteria: SearchCriteria::All,
            uid: true,
        };
        assert_eq!(wire(&cmd, "A0004"), "A0004 UID SEARCH ALL\r\n");
    }

    #[test]
    fn test_uid_fetch() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::from_numbers(&[5, 3, 4]).unwrap(),
            items: FetchAttribute::summary(),
            uid: true,
        };
        assert_eq!(
            wire(&cmd, "A0005"),
            "A0005 UID FETCH 3:5 (UID FLAGS RFC822.SIZE ENVELOPE)\r\n"
        );
        assert_eq!(cmd.name(), "UID FETCH");
    }

    #[test]
    fn test_uid_store() {
        let cmd = Command::Store {
            sequence: SequenceSet::single(5).unwrap(),
            action: StoreAction::AddFlags(vec![Flag::Deleted]),
            uid: true,
        };
        assert_eq!(wire(&cmd, "A0006"), "A0006 UID STORE 5 +FLAGS (\\Deleted)\r\n");

        let cmd = Command::Store {
            sequence: SequenceSet::single(9).unwrap(),
            action: StoreAction::toggle(vec![Flag::Seen], false),
            uid: true,
        };
        assert_eq!(wire(&cmd, "A0007"), "A0007 UID STORE 9 -FLAGS (\\Seen)\r\n");
    }

    #[test]
    fn test_debug_is_wire_form() {
        let cmd = Command::Search {
            criteria: SearchCriteria::subject_or_from("q"),
            uid: true,
        };
        assert_eq!(format!("{cmd:?}"), "UID SEARCH OR SUBJECT \"q\" FROM \"q\"");
    }
}
