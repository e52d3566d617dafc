//! SMTP client connection.
//!
//! The dialogue is strictly request-then-reply, and every step checks the
//! exact reply code it requires:
//!
//! ```text
//! greeting 220 → EHLO 250 → [STARTTLS 220 → TLS → EHLO 250]
//!   → AUTH LOGIN 334 → user 334 → password 235
//!   → MAIL FROM 250 → RCPT TO 250/251 (each) → DATA 354 → body . 250
//!   → QUIT 221
//! ```

#![allow(clippy::missing_errors_doc)]

use std::collections::HashSet;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use super::ServerInfo;
use super::config::{Config, Security};
use super::stream::{SmtpStream, StartTls, connect};
use crate::command::{Command, dot_stuff};
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};

/// SMTP client connection over any byte stream.
pub struct SmtpConnection<S> {
    reader: BufReader<S>,
    io_timeout: Duration,
    server_info: ServerInfo,
    ehlo_name: Option<String>,
    authenticated: bool,
    commands_sent: u32,
}

impl<S> std::fmt::Debug for SmtpConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnection")
            .field("server_info", &self.server_info)
            .field("authenticated", &self.authenticated)
            .field("commands_sent", &self.commands_sent)
            .finish_non_exhaustive()
    }
}

impl SmtpConnection<SmtpStream> {
    /// Connects, reads the greeting, sends EHLO and, for
    /// [`Security::StartTls`], upgrades when the server offers STARTTLS.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream = connect(config).await?;
        let mut conn = Self::from_stream(stream, config.io_timeout).await?;
        conn.ehlo(&config.ehlo_name).await?;
        if config.security == Security::StartTls {
            return conn.starttls_if_offered(&config.host).await;
        }
        Ok(conn)
    }
}

impl<S> SmtpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting, which must
    /// be exactly `220`.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut conn = Self {
            reader: BufReader::new(stream),
            io_timeout,
            server_info: ServerInfo::default(),
            ehlo_name: None,
            authenticated: false,
            commands_sent: 0,
        };

        let greeting = conn.read_reply().await?;
        require(&greeting, ReplyCode::SERVICE_READY)?;
        conn.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(server = %conn.server_info.hostname, "SMTP greeting");
        Ok(conn)
    }

    /// Returns what the server announced in its greeting and EHLO reply.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true once AUTH succeeded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Number of commands written so far.
    #[must_use]
    pub const fn commands_sent(&self) -> u32 {
        self.commands_sent
    }

    /// Sends EHLO and records the advertised extensions.
    pub async fn ehlo(&mut self, name: &str) -> Result<&ServerInfo> {
        let command = Command::Ehlo {
            hostname: name.to_string(),
        };
        let reply = self.expect(&command, ReplyCode::OK).await?;

        // The first line is the server's own greeting.
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        self.ehlo_name = Some(name.to_string());
        Ok(&self.server_info)
    }

    /// Authenticates with AUTH LOGIN.
    ///
    /// Fails with [`Error::NotSupported`] when the server advertises AUTH
    /// mechanisms and LOGIN is not among them.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let mechanisms = self.server_info.auth_mechanisms();
        if !mechanisms.is_empty() && !mechanisms.contains(&AuthMechanism::Login) {
            return Err(Error::NotSupported("AUTH LOGIN".into()));
        }

        self.expect(&Command::AuthLogin, ReplyCode::AUTH_CONTINUE)
            .await?;
        let user = Command::AuthResponse(STANDARD.encode(username));
        self.expect(&user, ReplyCode::AUTH_CONTINUE).await?;
        let pass = Command::AuthResponse(STANDARD.encode(password));
        self.expect(&pass, ReplyCode::AUTH_SUCCESS).await?;

        self.authenticated = true;
        tracing::debug!(user = %username, "authenticated");
        Ok(())
    }

    /// Starts a mail transaction.
    pub async fn mail_from(&mut self, from: &Address) -> Result<()> {
        let command = Command::MailFrom { from: from.clone() };
        self.expect(&command, ReplyCode::OK).await?;
        Ok(())
    }

    /// Adds a recipient. Only `250` and `251` are accepted.
    pub async fn rcpt_to(&mut self, to: &Address) -> Result<()> {
        let command = Command::RcptTo { to: to.clone() };
        let reply = self.execute(&command).await?;
        if reply.is(ReplyCode::OK) || reply.is(ReplyCode::FORWARD) {
            return Ok(());
        }
        Err(Error::RecipientRejected {
            recipient: to.to_string(),
            code: reply.code.as_u16(),
            line: reply.to_string(),
        })
    }

    /// Sends DATA, then the dot-stuffed message and the terminating `.`
    /// line. Returns the server's acceptance reply.
    pub async fn data(&mut self, message: &[u8]) -> Result<Reply> {
        self.expect(&Command::Data, ReplyCode::START_DATA).await?;
        self.write(&dot_stuff(message)).await?;
        let reply = self.read_reply().await?;
        require(&reply, ReplyCode::OK)?;
        Ok(reply)
    }

    /// Runs one whole mail transaction: MAIL FROM, RCPT TO for every
    /// recipient, then DATA. The first failing step aborts it.
    pub async fn send(
        &mut self,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<Reply> {
        if recipients.is_empty() {
            return Err(Error::Protocol("message has no recipients".into()));
        }
        self.mail_from(from).await?;
        for recipient in recipients {
            self.rcpt_to(recipient).await?;
        }
        self.data(message).await
    }

    /// Resets the current mail transaction.
    pub async fn rset(&mut self) -> Result<()> {
        self.expect(&Command::Rset, ReplyCode::OK).await?;
        Ok(())
    }

    /// Sends NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        self.expect(&Command::Noop, ReplyCode::OK).await?;
        Ok(())
    }

    /// Sends QUIT and closes the transport. The transport is shut down even
    /// when QUIT fails.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.expect(&Command::Quit, ReplyCode::CLOSING).await;
        let _ = self.reader.get_mut().shutdown().await;
        result.map(|_| ())
    }

    async fn expect(&mut self, command: &Command, code: ReplyCode) -> Result<Reply> {
        let reply = self.execute(command).await?;
        require(&reply, code)?;
        Ok(reply)
    }

    async fn execute(&mut self, command: &Command) -> Result<Reply> {
        tracing::debug!(command = ?command, "sending");
        self.write(&command.serialize()).await?;
        self.commands_sent += 1;
        let reply = self.read_reply().await?;
        tracing::debug!(command = command.name(), code = reply.code.as_u16(), "reply");
        Ok(reply)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.io_timeout;
        let stream = self.reader.get_mut();
        timeout(limit, async move {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| Error::Timeout(limit))??;
        Ok(())
    }

    /// Reads one complete (possibly multi-line) reply within the I/O
    /// timeout.
    async fn read_reply(&mut self) -> Result<Reply> {
        let limit = self.io_timeout;
        let reader = &mut self.reader;
        let lines = timeout(limit, async move {
            let mut lines = Vec::new();
            let mut raw = Vec::new();
            loop {
                raw.clear();
                if reader.read_until(b'\n', &mut raw).await? == 0 {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed",
                    )));
                }
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if line.is_empty() {
                    continue;
                }
                let last = is_last_reply_line(&line);
                lines.push(line);
                if last {
                    return Ok::<_, Error>(lines);
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout(limit))??;

        parse_reply(&lines)
    }
}

impl<S> SmtpConnection<S>
where
    S: StartTls,
{
    /// Returns true if the transport is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.reader.get_ref().is_tls()
    }

    /// If the last EHLO advertised STARTTLS on a plaintext transport,
    /// negotiates it, re-wraps the transport in TLS and repeats EHLO with
    /// the same name. Otherwise the connection is returned unchanged.
    pub async fn starttls_if_offered(mut self, host: &str) -> Result<Self> {
        if self.is_tls() {
            return Ok(self);
        }
        let Some(ehlo_name) = self.ehlo_name.clone() else {
            return Err(Error::Protocol("STARTTLS requires a prior EHLO".into()));
        };
        if !self.server_info.supports_starttls() {
            tracing::debug!("server does not offer STARTTLS");
            return Ok(self);
        }

        self.expect(&Command::StartTls, ReplyCode::SERVICE_READY)
            .await?;
        // Anything already buffered arrived before encryption.
        if !self.reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "unexpected data before TLS handshake".into(),
            ));
        }

        let Self {
            reader,
            io_timeout,
            server_info,
            commands_sent,
            ..
        } = self;
        let tls = reader.into_inner().start_tls(host, io_timeout).await?;
        tracing::info!(host, "upgraded to TLS");

        let mut conn = Self {
            reader: BufReader::new(tls),
            io_timeout,
            server_info: ServerInfo {
                hostname: server_info.hostname,
                extensions: HashSet::new(),
            },
            ehlo_name: None,
            authenticated: false,
            commands_sent,
        };
        conn.ehlo(&ehlo_name).await?;
        Ok(conn)
    }
}

fn require(reply: &Reply, code: ReplyCode) -> Result<()> {
    if reply.is(code) {
        return Ok(());
    }
    Err(Error::UnexpectedReply {
        expected: code.as_u16(),
        code: reply.code.as_u16(),
        line: reply.to_string(),
    })
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
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_greeting_must_be_220() {
        let mock = Builder::new()
            .read(b"554 5.3.2 no service\r\n")
            .build();
        let err = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap_err();
        match err {
            Error::UnexpectedReply {
                expected,
                code,
                line,
            } => {
                assert_eq!(expected, 220);
                assert_eq!(code, 554);
                assert_eq!(line, "554 5.3.2 no service");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multi_line_greeting() {
        let mock = Builder::new()
            .read(b"220-mx.example.com ESMTP\r\n220 ready\r\n")
            .build();
        let conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        assert_eq!(conn.server_info().hostname, "mx.example.com");
    }

    #[tokio::test]
    async fn test_ehlo_records_extensions() {
        let mock = Builder::new()
            .read(b"220 mx ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-mx greets localhost\r\n250-SIZE 1000\r\n250-AUTH PLAIN LOGIN\r\n250 STARTTLS\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let info = conn.ehlo("localhost").await.unwrap();
        assert!(info.supports_starttls());
        assert!(info.supports(&Extension::Size(Some(1000))));
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::Plain, AuthMechanism::Login]
        );
    }

    #[tokio::test]
    async fn test_auth_login_exchange() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"c2VjcmV0\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        conn.auth_login("user", "secret").await.unwrap();
        assert!(conn.is_authenticated());
        assert_eq!(conn.commands_sent(), 3);
    }

    #[tokio::test]
    async fn test_auth_login_rejected() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"d3Jvbmc=\r\n")
            .read(b"535 5.7.8 bad credentials\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let err = conn.auth_login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply { expected: 235, code: 535, .. }));
        assert!(!conn.is_authenticated());
    }

    #[tokio::test]
    async fn test_auth_login_not_advertised() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-mx\r\n250 AUTH XOAUTH2\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        conn.ehlo("localhost").await.unwrap();
        let err = conn.auth_login("user", "secret").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_send_transaction() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"MAIL FROM:<me@x.com>\r\n")
            .read(b"250 2.1.0 ok\r\n")
            .write(b"RCPT TO:<a@y.com>\r\n")
            .read(b"250 2.1.5 ok\r\n")
            .write(b"RCPT TO:<b@z.com>\r\n")
            .read(b"251 2.1.5 will forward\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: hi\r\n\r\n..leading dot\r\n.\r\n")
            .read(b"250 2.0.0 queued as 1234\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let from = Address::new("me@x.com").unwrap();
        let to = [Address::new("a@y.com").unwrap(), Address::new("b@z.com").unwrap()];
        let reply = conn
            .send(&from, &to, b"Subject: hi\r\n\r\n.leading dot\r\n")
            .await
            .unwrap();
        assert_eq!(reply.message_text(), "2.0.0 queued as 1234");
    }

    #[tokio::test]
    async fn test_rejected_recipient_aborts() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"MAIL FROM:<me@x.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<nobody@y.com>\r\n")
            .read(b"550 5.1.1 no such user\r\n")
            .write(b"RSET\r\n")
            .read(b"250 flushed\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let from = Address::new("me@x.com").unwrap();
        let to = [Address::new("nobody@y.com").unwrap()];
        let err = conn.send(&from, &to, b"x").await.unwrap_err();
        match err {
            Error::RecipientRejected {
                recipient,
                code,
                line,
            } => {
                assert_eq!(recipient, "nobody@y.com");
                assert_eq!(code, 550);
                assert_eq!(line, "550 5.1.1 no such user");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        conn.rset().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_without_recipients() {
        let mock = Builder::new().read(b"220 mx\r\n").build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let from = Address::new("me@x.com").unwrap();
        assert!(matches!(
            conn.send(&from, &[], b"x").await,
            Err(Error::Protocol(_))
        ));
        assert_eq!(conn.commands_sent(), 0);
    }

    #[tokio::test]
    async fn test_quit() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"NOOP\r\n")
            .read(b"250 ok\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        conn.noop().await.unwrap();
        conn.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_mid_reply() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"NOOP\r\n")
            .read(b"250-partial\r\n")
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        match conn.noop().await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout() {
        let mock = Builder::new()
            .read(b"220 mx\r\n")
            .write(b"NOOP\r\n")
            .wait(Duration::from_secs(10))
            .build();
        let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
        assert!(matches!(conn.noop().await, Err(Error::Timeout(t)) if t == TIMEOUT));
    }
}
