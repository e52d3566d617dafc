//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A connect, handshake or reply wait exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed reply or data the dialogue does not allow.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A reply code other than the one the dialogue step requires.
    #[error("Expected {expected}, server replied: {line}")]
    UnexpectedReply {
        /// The code the step requires.
        expected: u16,
        /// The code the server sent.
        code: u16,
        /// The server's full reply.
        line: String,
    },

    /// RCPT TO was answered with something other than 250 or 251.
    #[error("Recipient {recipient} rejected: {line}")]
    RecipientRejected {
        /// The rejected address.
        recipient: String,
        /// The code the server sent.
        code: u16,
        /// The server's full reply.
        line: String,
    },

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Returns the server reply code, if the error came from a reply.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedReply { code, .. } | Self::RecipientRejected { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.reply_code(), Some(code) if code >= 500 && code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.reply_code(), Some(code) if code >= 400 && code < 500)
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

    #[test]
    fn test_reply_classes() {
        let err = Error::UnexpectedReply {
            expected: 235,
            code: 535,
            line: "535 5.7.8 Authentication credentials invalid".to_string(),
        };
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Expected 235, server replied: 535 5.7.8 Authentication credentials invalid"
        );

        let err = Error::RecipientRejected {
            recipient: "a@x.com".to_string(),
            code: 450,
            line: "450 mailbox busy".to_string(),
        };
        assert!(err.is_transient());
        assert_eq!(err.reply_code(), Some(450));
    }

    #[test]
    fn test_transport_errors_have_no_code() {
        let err = Error::Timeout(Duration::from_secs(1));
        assert_eq!(err.reply_code(), None);
        assert!(!err.is_permanent());
    }
}
