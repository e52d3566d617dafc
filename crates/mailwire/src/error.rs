//! Error types for the facade clients.

use thiserror::Error;

/// Errors that can occur in facade operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailwire_imap::Error),

    /// SMTP operation failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailwire_smtp::Error),

    /// UID 0 never names a message.
    #[error("Invalid UID: {0}")]
    InvalidUid(u32),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
