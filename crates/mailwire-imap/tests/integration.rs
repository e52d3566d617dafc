//! Integration tests for the IMAP connection.
//!
//! A scripted stream plays the server side byte for byte; every write the
//! client makes must match the script exactly.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use proptest::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

use mailwire_imap::{
    Capability, Error, FetchAttribute, Flag, ImapConnection, SearchCriteria, SequenceSet,
    SessionState, StartTls, StoreAction,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Scripted stream whose TLS upgrade only flips a flag.
struct ScriptedStream {
    inner: Mock,
    tls: bool,
}

impl ScriptedStream {
    fn plain(inner: Mock) -> Self {
        Self { inner, tls: false }
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl StartTls for ScriptedStream {
    fn is_tls(&self) -> bool {
        self.tls
    }

    async fn start_tls(self, _host: &str, _timeout: Duration) -> mailwire_imap::Result<Self> {
        Ok(Self {
            inner: self.inner,
            tls: true,
        })
    }
}

#[tokio::test]
async fn test_select_populates_mailbox_info() {
    let mock = Builder::new()
        .read(b"* OK IMAP4rev1 ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK LOGIN completed\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 42 EXISTS\r\n")
        .read(b"* 3 RECENT\r\n")
        .read(b"* OK [UIDVALIDITY 7] UIDs valid\r\n")
        .read(b"* OK [UIDNEXT 4392] Predicted next UID\r\n")
        .read(b"* OK [UNSEEN 12] first unseen\r\n")
        .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
        .read(b"A0002 OK [READ-WRITE] SELECT completed\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    let info = conn.select("INBOX").await.unwrap();

    assert_eq!(info.name, "INBOX");
    assert_eq!(info.exists, 42);
    assert_eq!(info.recent, 3);
    assert_eq!(info.uid_validity, Some(7));
    assert_eq!(info.uid_next, Some(4392));
    assert_eq!(info.unseen, Some(12));
    assert_eq!(info.flags.len(), 5);
    assert!(!info.read_only);
    assert_eq!(conn.state(), &SessionState::Selected(info));
}

#[tokio::test]
async fn test_fetch_envelope_with_nil_cc() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 1 EXISTS\r\nA0002 OK\r\n")
        .write(b"A0003 UID FETCH 5 (UID FLAGS RFC822.SIZE ENVELOPE)\r\n")
        .read(b"* 1 FETCH (UID 5 FLAGS (\\Seen) RFC822.SIZE 120 ENVELOPE (")
        .read(b"\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Hello World\" ")
        .read(b"((\"Alice\" NIL \"alice\" \"x.com\")) NIL NIL ")
        .read(b"((NIL NIL \"bob\" \"y.org\")) NIL NIL NIL \"<id@x.com>\"))\r\n")
        .read(b"A0003 OK FETCH completed\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    conn.select("INBOX").await.unwrap();

    let set = SequenceSet::single(5).unwrap();
    let messages = conn.uid_fetch(&set, &FetchAttribute::summary()).await.unwrap();
    assert_eq!(messages.len(), 1);

    let message = &messages[0];
    assert_eq!(message.uid, Some(5));
    assert_eq!(message.size, Some(120));
    assert!(message.flags.as_ref().unwrap().is_seen());

    let envelope = message.envelope.as_ref().unwrap();
    assert_eq!(envelope.subject.as_deref(), Some("Hello World"));
    assert_eq!(envelope.cc, None);
    assert_eq!(envelope.from.as_ref().unwrap()[0].email, "alice@x.com");
    assert_eq!(envelope.to.as_ref().unwrap()[0].email, "bob@y.org");
    assert_eq!(envelope.message_id.as_deref(), Some("<id@x.com>"));
}

#[tokio::test]
async fn test_fetch_body_literals_split_across_reads() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"A0002 OK\r\n")
        .write(b"A0003 UID FETCH 9 (UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])\r\n")
        .read(b"* 3 FETCH (UID 9 BODY[HEADER] {28}\r\nSubject: Hi\r\n")
        .read(b"From: a@b.c\r\n\r\n BODY[TEXT] {22}\r\nline one\r\n")
        .read(b"A0003 OK x\r\n)\r\n")
        .read(b"A0003 OK FETCH completed\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    conn.select("INBOX").await.unwrap();

    let set = SequenceSet::single(9).unwrap();
    let messages = conn.uid_fetch(&set, &FetchAttribute::body()).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].section("BODY[HEADER]"),
        Some(&b"Subject: Hi\r\nFrom: a@b.c\r\n\r\n"[..])
    );
    assert_eq!(
        messages[0].section("BODY[TEXT]"),
        Some(&b"line one\r\nA0003 OK x\r\n"[..])
    );
}

#[tokio::test]
async fn test_uid_search_sorted_descending() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"A0002 OK\r\n")
        .write(b"A0003 UID SEARCH OR TO \"a@x.com\" TO \"b@x.com\"\r\n")
        .read(b"* SEARCH 4 17 9\r\nA0003 OK SEARCH completed\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    conn.select("INBOX").await.unwrap();

    let criteria = SearchCriteria::to_any(["a@x.com", "b@x.com"]).unwrap();
    let uids = conn.uid_search(&criteria).await.unwrap();
    assert_eq!(uids, vec![17, 9, 4]);
}

#[tokio::test]
async fn test_store_then_expunge() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 2 EXISTS\r\nA0002 OK\r\n")
        .write(b"A0003 UID STORE 5 +FLAGS (\\Deleted)\r\n")
        .read(b"* 2 FETCH (FLAGS (\\Deleted))\r\nA0003 OK STORE completed\r\n")
        .write(b"A0004 EXPUNGE\r\n")
        .read(b"* 2 EXPUNGE\r\nA0004 OK EXPUNGE completed\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    conn.select("INBOX").await.unwrap();

    let set = SequenceSet::single(5).unwrap();
    conn.uid_store(&set, StoreAction::AddFlags(vec![Flag::Deleted]))
        .await
        .unwrap();
    assert_eq!(conn.expunge().await.unwrap(), vec![2]);
    assert_eq!(conn.selected().unwrap().exists, 1);
    assert_eq!(conn.commands_sent(), 4);
}

#[tokio::test]
async fn test_store_failure_carries_server_text() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"A0002 OK\r\n")
        .write(b"A0003 UID STORE 5 +FLAGS (\\Deleted)\r\n")
        .read(b"A0003 NO [CANNOT] mailbox is read-only\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    conn.select("INBOX").await.unwrap();

    let set = SequenceSet::single(5).unwrap();
    let err = conn
        .uid_store(&set, StoreAction::AddFlags(vec![Flag::Deleted]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No(ref t) if t == "mailbox is read-only"));
    assert!(err.is_rejection());
}

#[tokio::test]
async fn test_fetch_before_select_fails_without_sending() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 NOOP\r\n")
        .read(b"A0002 OK\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();

    let set = SequenceSet::single(1).unwrap();
    let err = conn.fetch(&set, &[FetchAttribute::Flags]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    // The refused command consumed no tag.
    conn.noop().await.unwrap();
    assert_eq!(conn.commands_sent(), 2);
}

#[tokio::test]
async fn test_list_mailboxes() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
        .read(b"* LIST (\\Noselect \\HasChildren) \"/\" \"[Gmail]\"\r\n")
        .read(b"* LIST (\\HasNoChildren \\Sent) \"/\" \"[Gmail]/Sent Mail\"\r\n")
        .read(b"A0002 OK LIST completed\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.login("user", "secret").await.unwrap();
    let mailboxes = conn.list("", "*").await.unwrap();

    let names: Vec<&str> = mailboxes.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["INBOX", "[Gmail]", "[Gmail]/Sent Mail"]);
    assert!(!mailboxes[1].is_selectable());
    assert_eq!(mailboxes[2].delimiter.as_deref(), Some("/"));
}

#[tokio::test]
async fn test_starttls_skipped_when_not_offered() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 AUTH=PLAIN\r\nA0001 OK\r\n")
        .write(b"A0002 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0002 OK\r\n")
        .build();

    let conn = ImapConnection::from_stream(ScriptedStream::plain(mock), TIMEOUT)
        .await
        .unwrap();
    let mut conn = conn.starttls_if_offered("imap.example.com").await.unwrap();
    assert!(!conn.is_tls());
    assert!(conn.has_capability(&Capability::Auth("PLAIN".to_string())));
    conn.login("user", "secret").await.unwrap();
}

#[tokio::test]
async fn test_starttls_upgrade_then_login() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED\r\nA0001 OK\r\n")
        .write(b"A0002 STARTTLS\r\n")
        .read(b"A0002 OK Begin TLS negotiation now\r\n")
        .write(b"A0003 LOGIN \"user\" \"secret\"\r\n")
        .read(b"A0003 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n")
        .build();

    let conn = ImapConnection::from_stream(ScriptedStream::plain(mock), TIMEOUT)
        .await
        .unwrap();
    let mut conn = conn.starttls_if_offered("imap.example.com").await.unwrap();
    assert!(conn.is_tls());
    assert!(conn.capabilities().is_empty());

    conn.login("user", "secret").await.unwrap();
    assert!(conn.has_capability(&Capability::Idle));
}

#[tokio::test]
async fn test_starttls_rejects_injected_plaintext() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 STARTTLS\r\nA0001 OK\r\n")
        .write(b"A0002 STARTTLS\r\n")
        .read(b"A0002 OK go\r\n* OK injected\r\n")
        .build();

    let conn = ImapConnection::from_stream(ScriptedStream::plain(mock), TIMEOUT)
        .await
        .unwrap();
    let result = conn.starttls_if_offered("imap.example.com").await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn test_starttls_noop_when_already_tls() {
    let mock = Builder::new().read(b"* OK ready\r\n").build();
    let stream = ScriptedStream {
        inner: mock,
        tls: true,
    };
    let conn = ImapConnection::from_stream(stream, TIMEOUT).await.unwrap();
    let conn = conn.starttls_if_offered("imap.example.com").await.unwrap();
    assert_eq!(conn.commands_sent(), 0);
}

#[tokio::test]
async fn test_tags_strictly_increase() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 NOOP\r\n")
        .read(b"A0001 OK\r\n")
        .write(b"A0002 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1\r\nA0002 OK\r\n")
        .write(b"A0003 NOOP\r\n")
        .read(b"A0003 BAD try again\r\n")
        .write(b"A0004 NOOP\r\n")
        .read(b"A0004 OK\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    conn.noop().await.unwrap();
    conn.capability().await.unwrap();
    assert!(matches!(conn.noop().await, Err(Error::Bad(_))));
    conn.noop().await.unwrap();
    assert_eq!(conn.commands_sent(), 4);
}

#[tokio::test]
async fn test_closed_connection_mid_response() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 NOOP\r\n")
        .read(b"* 3 EXISTS\r\n")
        .build();

    let mut conn = ImapConnection::from_stream(mock, TIMEOUT).await.unwrap();
    match conn.noop().await {
        Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected EOF, got {other:?}"),
    }
}

fn greet(greeting: &[u8]) -> mailwire_imap::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let mock = Builder::new().read(greeting).build();
        ImapConnection::from_stream(mock, TIMEOUT).await.map(|_| ())
    })
}

proptest! {
    #[test]
    fn prop_ok_greeting_connects(text in "[A-Za-z0-9 .,:!-]{0,60}") {
        let greeting = format!("* OK {text}\r\n");
        prop_assert!(greet(greeting.as_bytes()).is_ok());
    }

    #[test]
    fn prop_other_first_line_fails(
        first in "(NO|BAD|PREAUTH|BYE|CAPABILITY|1 EXISTS)",
        text in "[A-Za-z0-9 .,:!-]{0,40}",
        untagged in any::<bool>(),
    ) {
        let greeting = if untagged {
            format!("* {first} {text}\r\n")
        } else {
            format!("A1 {first} {text}\r\n")
        };
        prop_assert!(greet(greeting.as_bytes()).is_err());
    }
}
