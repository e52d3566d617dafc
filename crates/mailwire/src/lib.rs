//! # mailwire
//!
//! Per-call IMAP and SMTP clients over the `mailwire-imap`, `mailwire-smtp`
//! and `mailwire-mime` crates.
//!
//! Each operation opens its own connection, authenticates, runs and
//! disconnects; LOGOUT and QUIT are attempted on every path.
//!
//! ```ignore
//! use mailwire::{ImapClient, ImapConfig, ListOptions, SmtpClient, SmtpConfig};
//! use mailwire_mime::EmailMessage;
//!
//! # async fn run() -> mailwire::Result<()> {
//! let imap = ImapClient::new(ImapConfig::from_env()?);
//! let page = imap.list_emails("INBOX", ListOptions::page(1)).await?;
//! println!("{} of {}", page.emails.len(), page.total);
//!
//! let smtp = SmtpClient::new(SmtpConfig::from_env()?);
//! let result = smtp
//!     .send(&EmailMessage::new("a@example.com", "Hello").with_text("Hi"))
//!     .await;
//! println!("{} {}", result.success, result.message_id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod model;
pub mod service;

pub use config::{ImapConfig, Security, SmtpConfig};
pub use error::{Error, Result};
pub use model::{EmailBody, EmailPage, ListOptions, SendResult};
pub use service::{ImapClient, SmtpClient};
