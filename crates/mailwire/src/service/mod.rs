//! Facade clients: one connection per call.

mod imap;
mod smtp;

pub use imap::ImapClient;
pub use smtp::SmtpClient;
