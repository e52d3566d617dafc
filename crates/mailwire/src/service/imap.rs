//! Per-call IMAP client.
//!
//! Every operation opens its own connection, upgrades it with STARTTLS when
//! the configuration asks for it and the server offers it, logs in, runs the
//! commands it needs and logs out. Nothing is shared between calls.

use mailwire_imap::{
    FetchAttribute, Flag, ImapConnection, ImapStream, MailboxInfo, MailboxListing,
    SearchCriteria, SequenceSet, StoreAction,
};
use mailwire_mime::parse_body;

use crate::config::ImapConfig;
use crate::error::{Error, Result};
use crate::model::{EmailBody, EmailPage, ListOptions};

type Connection = ImapConnection<ImapStream>;

/// IMAP facade bound to one account.
#[derive(Debug, Clone)]
pub struct ImapClient {
    config: ImapConfig,
}

impl ImapClient {
    /// Creates a client; no connection is made until an operation runs.
    #[must_use]
    pub const fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ImapConfig {
        &self.config
    }

    /// Lists every mailbox (`LIST "" "*"`).
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, logging in or listing fails.
    pub async fn list_mailboxes(&self) -> Result<Vec<MailboxListing>> {
        self.with_session(async |conn: &mut Connection| Ok(conn.list("", "*").await?))
            .await
    }

    /// Selects `mailbox` and returns its status.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, logging in or selecting fails.
    pub async fn mailbox_info(&self, mailbox: &str) -> Result<MailboxInfo> {
        self.with_session(async |conn: &mut Connection| Ok(conn.select(mailbox).await?))
            .await
    }

    /// Lists one page of message headers, most recent first.
    ///
    /// With `only_allowed` and a non-empty allow-list, only messages
    /// addressed to an allowed recipient are counted and listed.
    ///
    /// # Errors
    ///
    /// Returns an error if any IMAP step fails.
    pub async fn list_emails(&self, mailbox: &str, options: ListOptions) -> Result<EmailPage> {
        let criteria = if options.only_allowed {
            self.allow_list().unwrap_or(SearchCriteria::All)
        } else {
            SearchCriteria::All
        };

        self.with_session(async |conn: &mut Connection| {
            conn.select(mailbox).await?;
            let uids = conn.uid_search(&criteria).await?;
            let (page, page_size) = options.bounds();
            let wanted = options.slice(&uids);

            let emails = match SequenceSet::from_numbers(wanted) {
                Some(set) => {
                    let mut headers: Vec<_> = conn
                        .uid_fetch(&set, &FetchAttribute::summary())
                        .await?
                        .into_iter()
                        .filter_map(mailwire_imap::FetchData::into_header)
                        .collect();
                    headers.sort_unstable_by(|a, b| b.uid.cmp(&a.uid));
                    headers
                }
                None => Vec::new(),
            };

            Ok(EmailPage {
                emails,
                total: uids.len(),
                page,
                page_size,
            })
        })
        .await
    }

    /// Searches subject and sender for `query`. Results are UIDs, most
    /// recent first, restricted to the allow-list when one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if any IMAP step fails.
    pub async fn search_emails(&self, mailbox: &str, query: &str) -> Result<Vec<u32>> {
        let allowed = self.allow_list();
        self.with_session(async |conn: &mut Connection| {
            conn.select(mailbox).await?;
            let mut uids = conn
                .uid_search(&SearchCriteria::subject_or_from(query))
                .await?;
            if let Some(allowed) = &allowed {
                let permitted = conn.uid_search(allowed).await?;
                uids.retain(|uid| permitted.contains(uid));
            }
            Ok(uids)
        })
        .await
    }

    /// Fetches and decodes one message without marking it read. `None` if
    /// the UID no longer exists; UID 0 is `None` without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if any IMAP step fails.
    pub async fn fetch_email(&self, mailbox: &str, uid: u32) -> Result<Option<EmailBody>> {
        let Some(set) = SequenceSet::single(uid) else {
            return Ok(None);
        };
        self.with_session(async |conn: &mut Connection| {
            conn.select(mailbox).await?;
            let fetched = conn
                .uid_fetch(&set, &FetchAttribute::body())
                .await?;

            let Some(data) = fetched.into_iter().find(|d| d.uid == Some(uid)) else {
                return Ok(None);
            };
            let header = data.section("BODY[HEADER]").unwrap_or_default();
            let text = data.section("BODY[TEXT]").unwrap_or_default();
            let parts = parse_body(header, text);

            Ok(Some(EmailBody {
                uid,
                text: parts.text,
                html: parts.html,
                headers: parts.headers,
            }))
        })
        .await
    }

    /// Adds `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if any IMAP step fails.
    pub async fn mark_read(&self, mailbox: &str, uid: u32) -> Result<()> {
        self.store(mailbox, uid, StoreAction::AddFlags(vec![Flag::Seen]))
            .await
    }

    /// Removes `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if any IMAP step fails.
    pub async fn mark_unread(&self, mailbox: &str, uid: u32) -> Result<()> {
        self.store(mailbox, uid, StoreAction::RemoveFlags(vec![Flag::Seen]))
            .await
    }

    /// Adds or removes `\Flagged`.
    ///
    /// # Errors
    ///
    /// Returns an error if any IMAP step fails.
    pub async fn set_flagged(&self, mailbox: &str, uid: u32, flagged: bool) -> Result<()> {
        self.store(mailbox, uid, StoreAction::toggle(vec![Flag::Flagged], flagged))
            .await
    }

    /// Marks the message `\Deleted` and expunges the mailbox. A rejected
    /// STORE aborts before EXPUNGE is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUid`] for UID 0, otherwise an error if any
    /// IMAP step fails.
    pub async fn delete_email(&self, mailbox: &str, uid: u32) -> Result<()> {
        let set = uid_set(uid)?;
        self.with_session(async |conn: &mut Connection| {
            conn.select(mailbox).await?;
            conn.uid_store(&set, StoreAction::AddFlags(vec![Flag::Deleted])).await?;
            conn.expunge().await?;
            Ok(())
        })
        .await
    }

    /// Checks that the server is reachable and accepts the credentials.
    pub async fn verify(&self) -> bool {
        match self.with_session(async |_: &mut Connection| Ok(())).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(host = %self.config.host, error = %e, "IMAP verification failed");
                false
            }
        }
    }

    async fn store(&self, mailbox: &str, uid: u32, action: StoreAction) -> Result<()> {
        let set = uid_set(uid)?;
        self.with_session(async move |conn: &mut Connection| {
            conn.select(mailbox).await?;
            conn.uid_store(&set, action).await?;
            Ok(())
        })
        .await
    }

    fn allow_list(&self) -> Option<SearchCriteria> {
        SearchCriteria::to_any(self.config.allowed_recipients.iter().cloned())
    }

    /// Connects and logs in, runs `op`, then logs out. LOGOUT is attempted
    /// whatever `op` returned; its failure is only logged.
    async fn with_session<T>(
        &self,
        op: impl AsyncFnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = ImapConnection::connect(&self.config.connection()).await?;
        if let Err(e) = conn
            .login(&self.config.username, &self.config.password)
            .await
        {
            close(conn).await;
            return Err(e.into());
        }

        let result = op(&mut conn).await;
        close(conn).await;
        result
    }
}

fn uid_set(uid: u32) -> Result<SequenceSet> {
    SequenceSet::single(uid).ok_or(Error::InvalidUid(uid))
}

async fn close(conn: Connection) {
    if let Err(e) = conn.logout().await {
        tracing::warn!(error = %e, "IMAP logout failed");
    }
}
