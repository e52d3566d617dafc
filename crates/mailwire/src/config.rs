//! Server configuration for the facade clients.
//!
//! Both structs deserialize with serde, so callers may load them from any
//! format; [`SmtpConfig::from_env`] and [`ImapConfig::from_env`] read the
//! process environment.

use std::collections::HashMap;
use std::time::Duration;

use mailwire_mime::Mailbox;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default per-step timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect, when offered.
    StartTls,
}

impl Security {
    /// Maps a "TLS on connect" flag.
    #[must_use]
    pub const fn from_tls_flag(secure: bool) -> Self {
        if secure { Self::Tls } else { Self::StartTls }
    }
}

impl From<Security> for mailwire_imap::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::Tls => Self::Implicit,
            Security::StartTls => Self::StartTls,
        }
    }
}

impl From<Security> for mailwire_smtp::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::Tls => Self::Implicit,
            Security::StartTls => Self::StartTls,
        }
    }
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ehlo_name() -> String {
    mailwire_smtp::connection::DEFAULT_EHLO_NAME.to_string()
}

/// IMAP server configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (993 for TLS, 143 otherwise).
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// When non-empty, only messages addressed to one of these are listed.
    #[serde(default)]
    pub allowed_recipients: Vec<String>,
    /// Bound on connect and on each command, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ImapConfig {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None | Security::StartTls => 143,
            Security::Tls => 993,
        }
    }

    /// Reads `IMAP_*` variables, falling back to `SMTP_HOST`, `SMTP_USER`
    /// and `SMTP_PASS` when the IMAP ones are unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing host or a malformed number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ImapConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing host or a malformed number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let host = var("IMAP_HOST")
            .or_else(|| var("SMTP_HOST"))
            .ok_or_else(|| Error::Config("IMAP_HOST is not set".into()))?;
        let security = Security::from_tls_flag(parse_flag("IMAP_SECURE", var("IMAP_SECURE"))?.unwrap_or(true));
        let port = parse_port("IMAP_PORT", var("IMAP_PORT"))?.unwrap_or(Self::default_port(security));

        Ok(Self {
            host,
            port,
            security,
            username: var("IMAP_USER").or_else(|| var("SMTP_USER")).unwrap_or_default(),
            password: var("IMAP_PASS").or_else(|| var("SMTP_PASS")).unwrap_or_default(),
            allowed_recipients: var("IMAP_ALLOWED_RECIPIENTS")
                .map(|list| split_list(&list))
                .unwrap_or_default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Connection settings for the IMAP crate.
    #[must_use]
    pub fn connection(&self) -> mailwire_imap::Config {
        let timeout = Duration::from_secs(self.timeout_secs);
        mailwire_imap::Config::builder(self.host.clone())
            .port(self.port)
            .security(self.security.into())
            .connect_timeout(timeout)
            .io_timeout(timeout)
            .build()
    }
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("allowed_recipients", &self.allowed_recipients)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// SMTP server configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (465 for TLS, 587 for STARTTLS, 25 for none).
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Default sender display name.
    #[serde(default)]
    pub from_name: Option<String>,
    /// Default sender address.
    pub from_email: String,
    /// Name announced with EHLO.
    #[serde(default = "default_ehlo_name")]
    pub ehlo_name: String,
    /// Bound on connect and on each reply, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl SmtpConfig {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }

    /// Reads `SMTP_*` variables. `SMTP_FROM_EMAIL` defaults to `SMTP_USER`;
    /// without `SMTP_SECURE`, implicit TLS is used only on port 465.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing host or a malformed number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`SmtpConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing host or a malformed number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let host = var("SMTP_HOST").ok_or_else(|| Error::Config("SMTP_HOST is not set".into()))?;
        let port = parse_port("SMTP_PORT", var("SMTP_PORT"))?;
        let security = match (parse_flag("SMTP_SECURE", var("SMTP_SECURE"))?, port) {
            (Some(secure), _) => Security::from_tls_flag(secure),
            (None, Some(465)) => Security::Tls,
            (None, _) => Security::StartTls,
        };
        let username = var("SMTP_USER").unwrap_or_default();

        Ok(Self {
            host,
            port: port.unwrap_or(Self::default_port(security)),
            security,
            from_email: var("SMTP_FROM_EMAIL").unwrap_or_else(|| username.clone()),
            username,
            password: var("SMTP_PASS").unwrap_or_default(),
            from_name: var("SMTP_FROM_NAME"),
            ehlo_name: default_ehlo_name(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// The default sender.
    #[must_use]
    pub fn sender(&self) -> Mailbox {
        let mailbox = Mailbox::new(self.from_email.clone());
        match &self.from_name {
            Some(name) => mailbox.with_name(name.clone()),
            None => mailbox,
        }
    }

    /// Connection settings for the SMTP crate.
    #[must_use]
    pub fn connection(&self) -> mailwire_smtp::Config {
        let timeout = Duration::from_secs(self.timeout_secs);
        mailwire_smtp::Config::builder(self.host.clone())
            .port(self.port)
            .security(self.security.into())
            .ehlo_name(self.ehlo_name.clone())
            .connect_timeout(timeout)
            .io_timeout(timeout)
            .build()
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .field("from_email", &self.from_email)
            .field("ehlo_name", &self.ehlo_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Builds a lookup over a fixed set of variables.
#[must_use]
pub fn lookup_from_map(vars: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key| vars.get(key).cloned()
}

fn parse_port(key: &str, value: Option<String>) -> Result<Option<u16>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| Error::Config(format!("{key} is not a valid port: {v}")))
        })
        .transpose()
}

fn parse_flag(key: &str, value: Option<String>) -> Result<Option<bool>> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("{key} is not a boolean: {v}"))),
        })
        .transpose()
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
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

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        lookup_from_map(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_smtp_from_env() {
        let config = SmtpConfig::from_lookup(vars(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "me@example.com"),
            ("SMTP_PASS", "secret"),
            ("SMTP_FROM_NAME", "Team"),
        ]))
        .unwrap();
        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.from_email, "me@example.com");
        assert_eq!(config.sender().to_string(), "Team <me@example.com>");
        assert_eq!(config.ehlo_name, "localhost");
    }

    #[test]
    fn test_smtp_port_465_implies_tls() {
        let config = SmtpConfig::from_lookup(vars(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "465"),
        ]))
        .unwrap();
        assert_eq!(config.security, Security::Tls);

        let config = SmtpConfig::from_lookup(vars(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_SECURE", "true"),
        ]))
        .unwrap();
        assert_eq!(config.port, 465);
    }

    #[test]
    fn test_smtp_errors() {
        assert!(matches!(
            SmtpConfig::from_lookup(vars(&[])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SmtpConfig::from_lookup(vars(&[("SMTP_HOST", "h"), ("SMTP_PORT", "99999")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SmtpConfig::from_lookup(vars(&[("SMTP_HOST", "h"), ("SMTP_SECURE", "maybe")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_imap_falls_back_to_smtp() {
        let config = ImapConfig::from_lookup(vars(&[
            ("SMTP_HOST", "mail.example.com"),
            ("SMTP_USER", "me@example.com"),
            ("SMTP_PASS", "secret"),
            ("IMAP_ALLOWED_RECIPIENTS", " Support@Example.com, ,sales@example.com "),
        ]))
        .unwrap();
        assert_eq!(config.host, "mail.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Tls);
        assert_eq!(config.username, "me@example.com");
        assert_eq!(config.password, "secret");
        assert_eq!(
            config.allowed_recipients,
            vec!["support@example.com", "sales@example.com"]
        );
    }

    #[test]
    fn test_imap_own_values_win() {
        let config = ImapConfig::from_lookup(vars(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("IMAP_HOST", "imap.example.com"),
            ("IMAP_SECURE", "false"),
            ("IMAP_USER", "reader"),
        ]))
        .unwrap();
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 143);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.username, "reader");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ImapConfig::from_lookup(vars(&[
            ("IMAP_HOST", "h"),
            ("IMAP_PASS", "hunter2"),
        ]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));

        let smtp = SmtpConfig::from_lookup(vars(&[("SMTP_HOST", "h"), ("SMTP_PASS", "hunter2")]))
            .unwrap();
        assert!(!format!("{smtp:?}").contains("hunter2"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: SmtpConfig = serde_json::from_str(
            r#"{"host":"h","port":587,"security":"starttls","username":"u","password":"p","fromEmail":"u@x.com"}"#,
        )
        .unwrap();
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.connection().port, 587);
    }
}
