//! # mailwire-mime
//!
//! MIME support for the mailwire IMAP and SMTP clients.
//!
//! ## Features
//!
//! - **Body parsing**: Split `BODY[HEADER]` / `BODY[TEXT]` payloads into a
//!   plain-text and an HTML rendition, walking nested multiparts
//! - **Message building**: Produce RFC 5322 messages with plain, HTML,
//!   `multipart/alternative` and `multipart/mixed` bodies plus attachments
//! - **Encoding/Decoding**: Base64, Quoted-Printable and RFC 2047 encoded words
//! - **Charsets**: Any charset known to `encoding_rs`, with Latin-1 fallback
//!
//! ## Quick Start
//!
//! ### Parsing a fetched body
//!
//! ```
//! use mailwire_mime::parse_body;
//!
//! let header = b"Content-Type: text/plain; charset=utf-8\r\n\r\n";
//! let text = b"Hello, World!";
//!
//! let body = parse_body(header, text);
//! assert_eq!(body.text.as_deref(), Some("Hello, World!"));
//! assert!(body.html.is_none());
//! ```
//!
//! ### Building a message
//!
//! ```
//! use mailwire_mime::{EmailMessage, MessageBuilder, Mailbox};
//!
//! let message = EmailMessage::new("friend@example.com", "Hello")
//!     .with_text("Plain text version")
//!     .with_html("<p>HTML version</p>");
//!
//! let raw = MessageBuilder::new(&message, &Mailbox::new("me@example.com"))
//!     .message_id("<1234@example.com>")
//!     .build();
//! assert!(raw.contains("multipart/alternative"));
//! ```
//!
//! ### Encoded words
//!
//! ```
//! use mailwire_mime::encoded_word::decode_words;
//!
//! assert_eq!(decode_words("=?UTF-8?B?UsOpc3Vtw6k=?="), "Résumé");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod body;
mod builder;
mod content_type;
mod error;
mod header;

pub mod encoded_word;
pub mod encoding;

pub use body::{BodyParts, MAX_MULTIPART_DEPTH, TransferEncoding, parse_body};
pub use builder::{Attachment, EmailMessage, Mailbox, MessageBuilder, Recipients};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
