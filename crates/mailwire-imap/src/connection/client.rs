//! IMAP client connection.
//!
//! One [`ImapConnection`] owns one transport for its whole life. Commands are
//! strictly sequential: each waits for its complete tagged response before
//! the next is written. The connection tracks the protocol state and refuses
//! commands the current state does not allow:
//!
//! ```text
//! Connected ── login() ──→ Authenticated ── select() ──→ Selected
//!     │                          │   ↑                      │
//!     │                          │   └── failed select() ───┤
//!     └──────────────── logout() ┴──────────────────────────┘
//! ```

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::config::{Config, Security};
use super::framed::FramedStream;
use super::stream::{ImapStream, StartTls, connect};
use crate::command::{Command, FetchAttribute, SearchCriteria, StoreAction, TagGenerator};
use crate::parser::{
    FetchData, ResponseCode, TaggedStatus, UntaggedResponse, parse_tagged, parse_untagged,
};
use crate::types::{Capability, MailboxInfo, MailboxListing, SequenceSet, Status};
use crate::{Error, Result};

/// Protocol state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting received, not logged in.
    Connected,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected(MailboxInfo),
    /// LOGOUT sent, or the server said BYE.
    LoggedOut,
}

/// IMAP client connection.
pub struct ImapConnection<S> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    state: SessionState,
    capabilities: Vec<Capability>,
}

impl<S> std::fmt::Debug for ImapConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("tags", &self.tags)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ImapConnection<ImapStream> {
    /// Connects, reads the greeting and, for [`Security::StartTls`],
    /// upgrades the connection when the server offers STARTTLS.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream = connect(config).await?;
        let conn = Self::from_stream(stream, config.io_timeout).await?;
        if config.security == Security::StartTls {
            return conn.starttls_if_offered(&config.host).await;
        }
        Ok(conn)
    }
}

impl<S> ImapConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting.
    ///
    /// Only an untagged `OK` greeting is accepted; `BYE` yields
    /// [`Error::Bye`] and anything else [`Error::Protocol`].
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut stream = FramedStream::new(stream, io_timeout);
        let greeting = stream.read_unit().await?;

        let capabilities = match parse_untagged(&greeting) {
            Ok(UntaggedResponse::Status {
                status: Status::Ok,
                code,
                text,
            }) => {
                tracing::debug!(greeting = %text, "server greeting");
                match code {
                    Some(ResponseCode::Capability(caps)) => caps,
                    _ => Vec::new(),
                }
            }
            Ok(UntaggedResponse::Status {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {}",
                    String::from_utf8_lossy(&greeting).trim_end()
                )));
            }
        };

        Ok(Self {
            stream,
            tags: TagGenerator::default(),
            state: SessionState::Connected,
            capabilities,
        })
    }

    /// Returns the current protocol state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the selected mailbox, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<&MailboxInfo> {
        match &self.state {
            SessionState::Selected(info) => Some(info),
            _ => None,
        }
    }

    /// Returns the last known server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Number of commands issued on this connection.
    #[must_use]
    pub const fn commands_sent(&self) -> u32 {
        self.tags.issued()
    }

    /// Sends a command and reads its complete response without judging the
    /// tagged status.
    pub async fn execute(
        &mut self,
        command: &Command,
    ) -> Result<(Vec<UntaggedResponse>, TaggedStatus)> {
        if self.state == SessionState::LoggedOut {
            return Err(Error::InvalidState("connection is logged out".to_string()));
        }
        let tag = self
            .tags
            .next_tag()
            .ok_or_else(|| Error::Protocol("command tags exhausted".to_string()))?;

        tracing::debug!(%tag, command = ?command, "sending");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let framed = self.stream.read_response(&tag).await?;
        let status = parse_tagged(&framed.tagged)?;
        tracing::debug!(%tag, status = ?status.status, text = %status.text, "completed");

        let mut untagged = Vec::with_capacity(framed.untagged.len());
        for unit in &framed.untagged {
            match parse_untagged(unit) {
                Ok(UntaggedResponse::Status {
                    status: Status::Bye,
                    ref text,
                    ..
                }) => {
                    tracing::debug!(text = %text, "server said BYE");
                    self.state = SessionState::LoggedOut;
                }
                Ok(response) => untagged.push(response),
                Err(e) => tracing::warn!(error = %e, "skipping unparseable response"),
            }
        }

        Ok((untagged, status))
    }

    /// Like [`execute`](Self::execute), but a non-OK tagged status becomes
    /// an error carrying the server's text.
    async fn run(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        let (untagged, status) = self.execute(command).await?;
        status.into_result()?;
        Ok(untagged)
    }

    fn require_authenticated(&self, command: &str) -> Result<()> {
        match self.state {
            SessionState::Authenticated | SessionState::Selected(_) => Ok(()),
            _ => Err(Error::InvalidState(format!("{command} requires login"))),
        }
    }

    fn require_selected(&self, command: &str) -> Result<()> {
        match self.state {
            SessionState::Selected(_) => Ok(()),
            _ => Err(Error::InvalidState(format!(
                "{command} requires a selected mailbox"
            ))),
        }
    }

    /// Sends CAPABILITY and stores the result.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        let untagged = self.run(&Command::Capability).await?;
        let caps: Vec<Capability> = untagged
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Capability(caps) => Some(caps),
                _ => None,
            })
            .flatten()
            .collect();
        self.capabilities.clone_from(&caps);
        Ok(caps)
    }

    /// Sends NOOP. While a mailbox is selected, message counts reported by
    /// the server are applied to it.
    pub async fn noop(&mut self) -> Result<()> {
        let untagged = self.run(&Command::Noop).await?;
        if let SessionState::Selected(info) = &mut self.state {
            for response in untagged {
                match response {
                    UntaggedResponse::Exists(n) => info.exists = n,
                    UntaggedResponse::Recent(n) => info.recent = n,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Authenticates with LOGIN. Any non-OK status is [`Error::Auth`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::InvalidState("already authenticated".to_string()));
        }
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let (untagged, status) = self.execute(&command).await?;
        if status.status != Status::Ok {
            return Err(Error::Auth(status.text));
        }

        for response in untagged {
            if let UntaggedResponse::Capability(caps) = response {
                self.capabilities = caps;
            }
        }
        if let Some(ResponseCode::Capability(caps)) = status.code {
            self.capabilities = caps;
        }

        self.state = SessionState::Authenticated;
        tracing::debug!(user = %username, "logged in");
        Ok(())
    }

    /// Lists mailboxes matching a pattern.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<MailboxListing>> {
        self.require_authenticated("LIST")?;
        let command = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let untagged = self.run(&command).await?;
        Ok(untagged
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::List(listing) => Some(listing),
                _ => None,
            })
            .collect())
    }

    /// Selects a mailbox and records it as current.
    ///
    /// A failed SELECT leaves no mailbox selected.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxInfo> {
        self.require_authenticated("SELECT")?;
        let command = Command::Select {
            mailbox: mailbox.to_string(),
        };
        let (untagged, status) = self.execute(&command).await?;
        if status.status != Status::Ok {
            if self.state != SessionState::LoggedOut {
                self.state = SessionState::Authenticated;
            }
            return Err(status
                .into_result()
                .err()
                .unwrap_or_else(|| Error::Protocol("SELECT was not accepted".to_string())));
        }
        let read_only = status.code == Some(ResponseCode::ReadOnly);

        let mut info = MailboxInfo::new(mailbox);
        for response in untagged {
            match response {
                UntaggedResponse::Exists(n) => info.exists = n,
                UntaggedResponse::Recent(n) => info.recent = n,
                UntaggedResponse::Flags(flags) => info.flags = flags,
                UntaggedResponse::Status {
                    code: Some(code), ..
                } => match code {
                    ResponseCode::UidValidity(n) => info.uid_validity = Some(n),
                    ResponseCode::UidNext(n) => info.uid_next = Some(n),
                    ResponseCode::Unseen(n) => info.unseen = Some(n),
                    _ => {}
                },
                _ => {}
            }
        }
        info.read_only = read_only;

        tracing::debug!(mailbox, exists = info.exists, "selected");
        self.state = SessionState::Selected(info.clone());
        Ok(info)
    }

    /// FETCH by message sequence numbers.
    pub async fn fetch(
        &mut self,
        sequence: &SequenceSet,
        items: &[FetchAttribute],
    ) -> Result<Vec<FetchData>> {
        self.fetch_inner(sequence, items, false).await
    }

    /// UID FETCH. Results arrive in server order.
    pub async fn uid_fetch(
        &mut self,
        uids: &SequenceSet,
        items: &[FetchAttribute],
    ) -> Result<Vec<FetchData>> {
        self.fetch_inner(uids, items, true).await
    }

    async fn fetch_inner(
        &mut self,
        sequence: &SequenceSet,
        items: &[FetchAttribute],
        uid: bool,
    ) -> Result<Vec<FetchData>> {
        let command = Command::Fetch {
            sequence: sequence.clone(),
            items: items.to_vec(),
            uid,
        };
        self.require_selected(command.name())?;
        let untagged = self.run(&command).await?;
        Ok(untagged
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Fetch(data) => Some(*data),
                _ => None,
            })
            .collect())
    }

    /// UID SEARCH. The UIDs come back sorted descending, most recent first.
    pub async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>> {
        self.require_selected("UID SEARCH")?;
        let command = Command::Search {
            criteria: criteria.clone(),
            uid: true,
        };
        let untagged = self.run(&command).await?;
        let mut uids: Vec<u32> = untagged
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Search(uids) => Some(uids),
                _ => None,
            })
            .flatten()
            .collect();
        uids.sort_unstable_by(|a, b| b.cmp(a));
        uids.dedup();
        Ok(uids)
    }

    /// UID STORE.
    pub async fn uid_store(&mut self, uids: &SequenceSet, action: StoreAction) -> Result<()> {
        self.require_selected("UID STORE")?;
        let command = Command::Store {
            sequence: uids.clone(),
            action,
            uid: true,
        };
        self.run(&command).await?;
        Ok(())
    }

    /// EXPUNGE. Returns the expunged sequence numbers as reported.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        self.require_selected("EXPUNGE")?;
        let untagged = self.run(&Command::Expunge).await?;
        let expunged: Vec<u32> = untagged
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Expunge(n) => Some(n),
                _ => None,
            })
            .collect();
        if let SessionState::Selected(info) = &mut self.state {
            info.exists = info
                .exists
                .saturating_sub(u32::try_from(expunged.len()).unwrap_or(u32::MAX));
        }
        Ok(expunged)
    }

    /// Sends LOGOUT and closes the transport.
    pub async fn logout(mut self) -> Result<()> {
        let result = self.execute(&Command::Logout).await;
        self.state = SessionState::LoggedOut;
        self.stream.shutdown().await;
        result?.1.into_result()?;
        Ok(())
    }
}

impl<S> ImapConnection<S>
where
    S: StartTls,
{
    /// Returns true if the transport is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.stream.get_ref().is_tls()
    }

    /// Queries CAPABILITY and, if STARTTLS is offered on a plaintext
    /// transport, negotiates it and re-wraps the transport in TLS. Otherwise
    /// the connection is returned unchanged.
    ///
    /// Capabilities learned before the upgrade are discarded.
    pub async fn starttls_if_offered(mut self, host: &str) -> Result<Self> {
        if self.is_tls() {
            return Ok(self);
        }
        if self.state != SessionState::Connected {
            return Err(Error::InvalidState(
                "STARTTLS is only valid before login".to_string(),
            ));
        }

        let caps = self.capability().await?;
        if !caps.contains(&Capability::StartTls) {
            tracing::debug!("server does not offer STARTTLS");
            return Ok(self);
        }

        self.run(&Command::StartTls).await?;

        let io_timeout = self.stream.io_timeout();
        let Self { stream, tags, state, .. } = self;
        // Bytes buffered past the OK would have been sent before encryption.
        let plain = stream.into_inner()?;
        let tls = plain.start_tls(host, io_timeout).await?;
        tracing::info!(host, "upgraded to TLS");

        Ok(Self {
            stream: FramedStream::new(tls, io_timeout),
            tags,
            state,
            capabilities: Vec::new(),
        })
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
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_greeting_ok() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] ready\r\n")
            .build();
        let conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
        assert_eq!(conn.state(), &SessionState::Connected);
        assert!(conn.has_capability(&Capability::StartTls));
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let result = ImapConnection::from_stream(mock, TIMEOUT).await;
        assert!(matches!(result, Err(Error::Bye(t)) if t == "too many connections"));
    }

    #[tokio::test]
    async fn test_greeting_rejected() {
        for greeting in [
            &b"* PREAUTH welcome\r\n"[..],
            b"* NO go away\r\n",
            b"+ hello\r\n",
            b"220 smtp.example.com ESMTP\r\n",
        ] {
            let mock = Builder::new().read(greeting).build();
            let result = ImapConnection::from_stream(mock, TIMEOUT).await;
            assert!(matches!(result, Err(Error::Protocol(_))), "{greeting:?}");
        }
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] bad credentials\r\n")
            .build();
        let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let err = conn.login("u", "p").await.unwrap_err();
        assert!(matches!(err, Error::Auth(t) if t == "bad credentials"));
        assert_eq!(conn.state(), &SessionState::Connected);
    }

    #[tokio::test]
    async fn test_commands_require_state() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
        let set = SequenceSet::single(1).unwrap();

        assert!(matches!(conn.list("", "*").await, Err(Error::InvalidState(_))));
        assert!(matches!(conn.select("INBOX").await, Err(Error::InvalidState(_))));
        assert!(matches!(
            conn.uid_fetch(&set, &FetchAttribute::summary()).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            conn.uid_search(&SearchCriteria::All).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(conn.expunge().await, Err(Error::InvalidState(_))));
        assert_eq!(conn.commands_sent(), 0);
    }

    #[tokio::test]
    async fn test_failed_select_deselects() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK logged in\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 1 EXISTS\r\nA0002 OK [READ-ONLY] done\r\n")
            .write(b"A0003 SELECT Nope\r\n")
            .read(b"A0003 NO no such mailbox\r\n")
            .build();
        let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
        conn.login("u", "p").await.unwrap();

        let info = conn.select("INBOX").await.unwrap();
        assert!(info.read_only);
        assert_eq!(conn.selected().map(|i| i.exists), Some(1));

        let err = conn.select("Nope").await.unwrap_err();
        assert!(matches!(err, Error::No(t) if t == "no such mailbox"));
        assert_eq!(conn.state(), &SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_select_after_failed_select() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK logged in\r\n")
            .write(b"A0002 SELECT Gone\r\n")
            .read(b"A0002 BAD [READ-ONLY] bogus\r\n")
            .write(b"A0003 SELECT INBOX\r\n")
            .read(b"* 4 EXISTS\r\nA0003 OK [READ-WRITE] done\r\n")
            .build();
        let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
        conn.login("u", "p").await.unwrap();

        let err = conn.select("Gone").await.unwrap_err();
        assert!(matches!(err, Error::Bad(t) if t == "bogus"));
        assert_eq!(conn.selected(), None);

        let info = conn.select("INBOX").await.unwrap();
        assert!(!info.read_only);
        assert_eq!(info.exists, 4);
        assert_eq!(conn.selected().map(|i| i.exists), Some(4));
    }

    #[tokio::test]
    async fn test_logout() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGOUT\r\n")
            .read(b"* BYE logging out\r\nA0001 OK LOGOUT completed\r\n")
            .build();
        let conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
        conn.logout().await.unwrap();
    }
}
