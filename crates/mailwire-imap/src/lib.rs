//! # mailwire-imap
//!
//! An async IMAP4rev1 client built directly on the wire protocol.
//!
//! ## Features
//!
//! - **Literal-aware framing**: `{n}` literals are consumed byte-exact, so
//!   bodies and envelope strings containing CRLF never split a response
//! - **STARTTLS**: opportunistic in-place upgrade of a plaintext connection
//! - **TLS via rustls**: secure connections without an OpenSSL dependency
//! - **Sans-I/O parser**: response parsing separated from network I/O
//! - **Tolerant envelopes**: malformed or NIL envelope data degrades to
//!   empty values instead of failing a whole listing
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_imap::{Config, FetchAttribute, ImapConnection, SearchCriteria, Security, SequenceSet};
//!
//! #[tokio::main]
//! async fn main() -> mailwire_imap::Result<()> {
//!     let config = Config::builder("imap.example.com")
//!         .security(Security::StartTls)
//!         .build();
//!     let mut conn = ImapConnection::connect(&config).await?;
//!     conn.login("user@example.com", "password").await?;
//!
//!     let info = conn.select("INBOX").await?;
//!     println!("{} messages", info.exists);
//!
//!     let uids = conn.uid_search(&SearchCriteria::All).await?;
//!     if let Some(set) = SequenceSet::from_numbers(&uids[..uids.len().min(10)]) {
//!         for message in conn.uid_fetch(&set, &FetchAttribute::summary()).await? {
//!             println!("{:?} {:?}", message.uid, message.envelope);
//!         }
//!     }
//!
//!     conn.logout().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders and types
//! - [`connection`]: transport, framing and the connection state machine
//! - [`parser`]: sans-I/O response, FETCH and ENVELOPE parsing
//! - [`types`]: core IMAP types (flags, mailboxes, envelopes, sequences)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, StoreAction, TagGenerator};
pub use connection::{
    Config, ConfigBuilder, FramedResponse, ImapConnection, ImapStream, ResponseFramer, Security,
    SessionState, StartTls,
};
pub use error::{Error, Result};
pub use parser::{FetchData, ResponseCode, TaggedStatus, UntaggedResponse};
pub use types::{
    Capability, EmailAddress, EmailEnvelope, EmailHeader, Flag, Flags, MailboxInfo,
    MailboxListing, SequenceSet, Status,
};
