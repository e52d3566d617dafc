//! `ImapClient` against a scripted IMAP server.

#![allow(clippy::unwrap_used)]

mod support;

use mailwire::{Error, ImapClient, ListOptions};
use support::{LOGIN_OK, LOGOUT_OK, SELECT_OK, closed_port, imap_config, imap_server};

#[tokio::test]
async fn test_list_mailboxes() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        "* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n* LIST (\\Noselect \\HasChildren) \"/\" \"Archive\"\r\n{tag} OK LIST completed\r\n",
        LOGOUT_OK,
    ])
    .await;

    let client = ImapClient::new(imap_config(port, &[]));
    let mailboxes = client.list_mailboxes().await.unwrap();
    assert_eq!(mailboxes.len(), 2);
    assert_eq!(mailboxes[0].name, "INBOX");
    assert!(mailboxes[0].is_selectable());
    assert!(!mailboxes[1].is_selectable());

    let sent = server.await.unwrap();
    assert_eq!(sent[0], "A0001 LOGIN \"user\" \"pass\"");
    assert_eq!(sent[1], "A0002 LIST \"\" \"*\"");
    assert_eq!(sent[2], "A0003 LOGOUT");
}

#[tokio::test]
async fn test_mailbox_info() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        "* 42 EXISTS\r\n* 3 RECENT\r\n* OK [UIDVALIDITY 7] UIDs valid\r\n{tag} OK [READ-WRITE] SELECT completed\r\n",
        LOGOUT_OK,
    ])
    .await;

    let info = ImapClient::new(imap_config(port, &[]))
        .mailbox_info("INBOX")
        .await
        .unwrap();
    assert_eq!(info.exists, 42);
    assert_eq!(info.recent, 3);
    assert_eq!(info.uid_validity, Some(7));

    let sent = server.await.unwrap();
    assert_eq!(sent[1], "A0002 SELECT INBOX");
}

#[tokio::test]
async fn test_list_emails_filters_pages_and_orders() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "* SEARCH 4 9 17\r\n{tag} OK SEARCH completed\r\n",
        concat!(
            "* 2 FETCH (UID 9 FLAGS (\\Seen) RFC822.SIZE 100 ENVELOPE (\"Mon, 1 Jan 2024 00:00:00 +0000\" \"First\" ((\"Ann\" NIL \"ann\" \"x.com\")) NIL NIL ((NIL NIL \"support\" \"x.com\")) NIL NIL NIL \"<1@x.com>\"))\r\n",
            "* 3 FETCH (UID 17 FLAGS () RFC822.SIZE 200 ENVELOPE (NIL \"=?UTF-8?B?UsOpc3Vtw6k=?=\" NIL NIL NIL NIL NIL NIL NIL NIL))\r\n",
            "{tag} OK FETCH completed\r\n",
        ),
        LOGOUT_OK,
    ])
    .await;

    let client = ImapClient::new(imap_config(port, &["support@x.com"]));
    let options = ListOptions {
        page: 1,
        page_size: 2,
        only_allowed: true,
    };
    let page = client.list_emails("INBOX", options).await.unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 2);
    let uids: Vec<u32> = page.emails.iter().map(|e| e.uid).collect();
    assert_eq!(uids, vec![17, 9]);
    assert_eq!(page.emails[0].envelope.subject.as_deref(), Some("Résumé"));
    assert_eq!(page.emails[1].envelope.subject.as_deref(), Some("First"));
    assert_eq!(page.emails[1].size, 100);
    let from = page.emails[1].envelope.from.as_ref().unwrap();
    assert_eq!(from[0].email, "ann@x.com");

    let sent = server.await.unwrap();
    assert_eq!(sent[2], "A0003 UID SEARCH TO \"support@x.com\"");
    assert!(sent[3].starts_with("A0004 UID FETCH "));
    assert!(sent[3].ends_with("(UID FLAGS RFC822.SIZE ENVELOPE)"));
}

#[tokio::test]
async fn test_list_emails_past_last_page_skips_fetch() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "* SEARCH 1 2\r\n{tag} OK SEARCH completed\r\n",
        LOGOUT_OK,
    ])
    .await;

    let page = ImapClient::new(imap_config(port, &[]))
        .list_emails("INBOX", ListOptions::page(5))
        .await
        .unwrap();
    assert!(page.emails.is_empty());
    assert_eq!(page.total, 2);

    let sent = server.await.unwrap();
    assert_eq!(sent[2], "A0003 UID SEARCH ALL");
    assert_eq!(sent[3], "A0004 LOGOUT");
}

#[tokio::test]
async fn test_search_intersects_allow_list() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "* SEARCH 3 5 8\r\n{tag} OK SEARCH completed\r\n",
        "* SEARCH 5 8 9\r\n{tag} OK SEARCH completed\r\n",
        LOGOUT_OK,
    ])
    .await;

    let client = ImapClient::new(imap_config(port, &["a@x.com", "b@x.com"]));
    let uids = client.search_emails("INBOX", "invoice").await.unwrap();
    assert_eq!(uids, vec![8, 5]);

    let sent = server.await.unwrap();
    assert_eq!(
        sent[2],
        "A0003 UID SEARCH OR SUBJECT \"invoice\" FROM \"invoice\""
    );
    assert_eq!(sent[3], "A0004 UID SEARCH OR TO \"a@x.com\" TO \"b@x.com\"");
}

#[tokio::test]
async fn test_fetch_email_decodes_alternative_body() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        concat!(
            "* 1 FETCH (UID 7 BODY[HEADER] {71}\r\n",
            "Subject: Report\r\nContent-Type: multipart/alternative; boundary=\"b1\"\r\n\r\n",
            " BODY[TEXT] {142}\r\n",
            "--b1\r\nContent-Type: text/html\r\n\r\n<p>Hi</p>\r\n",
            "--b1\r\nContent-Type: text/plain\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\nCaf=C3=A9\r\n",
            "--b1--\r\n",
            ")\r\n{tag} OK FETCH completed\r\n",
        ),
        LOGOUT_OK,
    ])
    .await;

    let body = ImapClient::new(imap_config(port, &[]))
        .fetch_email("INBOX", 7)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body.uid, 7);
    assert_eq!(body.text.as_deref().map(str::trim), Some("Café"));
    assert_eq!(body.html.as_deref().map(str::trim), Some("<p>Hi</p>"));
    assert_eq!(body.headers.get("subject").map(String::as_str), Some("Report"));

    let sent = server.await.unwrap();
    assert_eq!(
        sent[2],
        "A0003 UID FETCH 7 (UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])"
    );
}

#[tokio::test]
async fn test_fetch_email_missing_uid() {
    let (port, _server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "{tag} OK FETCH completed\r\n",
        LOGOUT_OK,
    ])
    .await;

    let body = ImapClient::new(imap_config(port, &[]))
        .fetch_email("INBOX", 99)
        .await
        .unwrap();
    assert!(body.is_none());
}

#[tokio::test]
async fn test_uid_zero_never_connects() {
    let client = ImapClient::new(imap_config(closed_port().await, &[]));

    assert!(client.fetch_email("INBOX", 0).await.unwrap().is_none());
    assert!(matches!(
        client.mark_read("INBOX", 0).await,
        Err(Error::InvalidUid(0))
    ));
    assert!(matches!(
        client.set_flagged("INBOX", 0, true).await,
        Err(Error::InvalidUid(0))
    ));
    assert!(matches!(
        client.delete_email("INBOX", 0).await,
        Err(Error::InvalidUid(0))
    ));
}

#[tokio::test]
async fn test_flag_operations() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "{tag} OK STORE completed\r\n",
        LOGOUT_OK,
    ])
    .await;
    ImapClient::new(imap_config(port, &[]))
        .set_flagged("INBOX", 12, false)
        .await
        .unwrap();
    let sent = server.await.unwrap();
    assert_eq!(sent[2], "A0003 UID STORE 12 -FLAGS (\\Flagged)");

    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "{tag} OK STORE completed\r\n",
        LOGOUT_OK,
    ])
    .await;
    ImapClient::new(imap_config(port, &[]))
        .mark_read("INBOX", 12)
        .await
        .unwrap();
    let sent = server.await.unwrap();
    assert_eq!(sent[2], "A0003 UID STORE 12 +FLAGS (\\Seen)");
}

#[tokio::test]
async fn test_delete_stores_then_expunges() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "{tag} OK STORE completed\r\n",
        "* 2 EXPUNGE\r\n{tag} OK EXPUNGE completed\r\n",
        LOGOUT_OK,
    ])
    .await;

    ImapClient::new(imap_config(port, &[]))
        .delete_email("INBOX", 5)
        .await
        .unwrap();

    let sent = server.await.unwrap();
    assert_eq!(sent[2], "A0003 UID STORE 5 +FLAGS (\\Deleted)");
    assert_eq!(sent[3], "A0004 EXPUNGE");
    assert_eq!(sent[4], "A0005 LOGOUT");
}

#[tokio::test]
async fn test_rejected_store_aborts_before_expunge() {
    let (port, server) = imap_server(vec![
        LOGIN_OK,
        SELECT_OK,
        "{tag} NO mailbox is read-only\r\n",
        LOGOUT_OK,
    ])
    .await;

    let err = ImapClient::new(imap_config(port, &[]))
        .delete_email("INBOX", 5)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Imap(mailwire_imap::Error::No(ref text)) if text == "mailbox is read-only"
    ));

    let sent = server.await.unwrap();
    assert!(sent.iter().all(|line| !line.contains("EXPUNGE")));
    assert_eq!(sent.last().map(String::as_str), Some("A0004 LOGOUT"));
}

#[tokio::test]
async fn test_login_failure_still_logs_out() {
    let (port, server) = imap_server(vec![
        "{tag} NO [AUTHENTICATIONFAILED] invalid credentials\r\n",
        LOGOUT_OK,
    ])
    .await;

    let err = ImapClient::new(imap_config(port, &[]))
        .list_mailboxes()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Imap(mailwire_imap::Error::Auth(_))));

    let sent = server.await.unwrap();
    assert_eq!(sent, vec!["A0001 LOGIN \"user\" \"pass\"", "A0002 LOGOUT"]);
}

#[tokio::test]
async fn test_verify() {
    let (port, _server) = imap_server(vec![LOGIN_OK, LOGOUT_OK]).await;
    assert!(ImapClient::new(imap_config(port, &[])).verify().await);

    let port = closed_port().await;
    assert!(!ImapClient::new(imap_config(port, &[])).verify().await);
}
