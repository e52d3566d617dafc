//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - Configuration (host, port, security mode, timeouts)
//! - TLS/plaintext stream abstraction with in-place STARTTLS upgrade
//! - Literal-aware response framing
//! - The connection state machine issuing tagged commands

mod client;
mod config;
mod framed;
mod stream;

pub use client::{ImapConnection, SessionState};
pub use config::{Config, ConfigBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, Security};
pub use framed::{
    FramedResponse, FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE, ResponseFramer,
};
pub use stream::{ImapStream, StartTls, connect, create_tls_connector};
