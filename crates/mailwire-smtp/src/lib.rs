//! # mailwire-smtp
//!
//! An async SMTP submission client built directly on the wire protocol.
//!
//! ## Features
//!
//! - **Exact reply checking**: every dialogue step requires one specific
//!   reply code; anything else is an error carrying the server's reply
//! - **TLS support**: both implicit TLS (port 465) and STARTTLS (port 587)
//! - **AUTH LOGIN** username/password authentication
//! - **Dot-stuffing**: message lines beginning with `.` are escaped and line
//!   endings normalized to CRLF
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_smtp::{Address, Config, Security, SmtpConnection};
//!
//! #[tokio::main]
//! async fn main() -> mailwire_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .security(Security::StartTls)
//!         .build();
//!     let mut conn = SmtpConnection::connect(&config).await?;
//!     conn.auth_login("user@example.com", "password").await?;
//!
//!     let from = Address::new("user@example.com")?;
//!     let to = [Address::new("friend@example.org")?];
//!     conn.send(&from, &to, b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!
//!     conn.quit().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders and DATA dot-stuffing
//! - [`connection`]: transport, configuration and the client dialogue
//! - [`parser`]: reply parser
//! - [`types`]: addresses, extensions, replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Config, ConfigBuilder, Security, ServerInfo, SmtpConnection, SmtpStream, StartTls};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
