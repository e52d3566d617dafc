//! `SmtpClient` against a scripted SMTP server.

#![allow(clippy::unwrap_used)]

mod support;

use mailwire::SmtpClient;
use mailwire_mime::{EmailMessage, Mailbox};
use support::{AUTH_OK, EHLO_OK, closed_port, smtp_config, smtp_server};

fn script(tail: &[&'static str]) -> Vec<&'static str> {
    let mut responses = vec![EHLO_OK];
    responses.extend(AUTH_OK);
    responses.extend_from_slice(tail);
    responses
}

#[tokio::test]
async fn test_send_encodes_subject_and_terminates_data() {
    let (port, server) = smtp_server(script(&[
        "250 sender ok\r\n",
        "250 recipient ok\r\n",
        "354 go ahead\r\n",
        "250 2.0.0 queued as 1234\r\n",
        "221 bye\r\n",
    ]))
    .await;

    let message = EmailMessage::new(vec!["a@x.com"], "Résumé").with_text("body");
    let result = SmtpClient::new(smtp_config(port)).send(&message).await;

    assert!(result.success, "{result:?}");
    assert!(result.message_id.starts_with('<'));
    assert!(result.message_id.ends_with("@example.com>"));
    assert_eq!(result.response.as_deref(), Some("250 2.0.0 queued as 1234"));
    assert!(result.error.is_none());

    let sent = server.await.unwrap();
    assert_eq!(sent[0], "EHLO localhost");
    assert_eq!(sent[1], "AUTH LOGIN");
    assert_eq!(sent[4], "MAIL FROM:<me@example.com>");
    assert_eq!(sent[5], "RCPT TO:<a@x.com>");
    assert_eq!(sent[6], "DATA");

    let payload = &sent[7];
    assert!(payload.contains("Subject: =?UTF-8?B?UsOpc3Vtw6k=?="));
    assert!(payload.contains(&format!("Message-ID: {}", result.message_id)));
    assert!(payload.ends_with("\r\n."));
    assert_eq!(sent[8], "QUIT");
}

#[tokio::test]
async fn test_from_override_used_for_mail_from() {
    let (port, server) = smtp_server(script(&[
        "250 ok\r\n",
        "250 ok\r\n",
        "251 will forward\r\n",
        "354 go ahead\r\n",
        "250 ok\r\n",
        "221 bye\r\n",
    ]))
    .await;

    let message = EmailMessage::new("a@x.com", "Hi")
        .with_text("hello")
        .with_bcc("hidden@y.org")
        .with_from(Mailbox::new("boss@corp.test").with_name("Boss"));
    let result = SmtpClient::new(smtp_config(port)).send(&message).await;
    assert!(result.success, "{result:?}");
    assert!(result.message_id.ends_with("@corp.test>"));

    let sent = server.await.unwrap();
    assert_eq!(sent[4], "MAIL FROM:<boss@corp.test>");
    assert_eq!(sent[5], "RCPT TO:<a@x.com>");
    assert_eq!(sent[6], "RCPT TO:<hidden@y.org>");
    assert!(sent[8].contains("From: Boss <boss@corp.test>"));
    assert!(!sent[8].contains("hidden@y.org"));
}

#[tokio::test]
async fn test_rejected_recipient_reported_with_message_id() {
    let (port, server) = smtp_server(script(&[
        "250 ok\r\n",
        "550 5.1.1 no such user\r\n",
        "250 reset\r\n",
        "221 bye\r\n",
    ]))
    .await;

    let message = EmailMessage::new("nobody@x.com", "Hi").with_text("hello");
    let result = SmtpClient::new(smtp_config(port)).send(&message).await;
    assert!(!result.success);
    assert!(!result.message_id.is_empty());
    assert!(result.error.as_deref().unwrap().contains("550 5.1.1 no such user"));

    let sent = server.await.unwrap();
    assert_eq!(sent[6], "RSET");
    assert_eq!(sent[7], "QUIT");
}

#[tokio::test]
async fn test_batch_continues_after_rejection() {
    let (port, server) = smtp_server(script(&[
        "250 ok\r\n",
        "550 no\r\n",
        "250 reset\r\n",
        "250 ok\r\n",
        "250 ok\r\n",
        "354 go ahead\r\n",
        "250 queued\r\n",
        "221 bye\r\n",
    ]))
    .await;

    let messages = [
        EmailMessage::new("bad@x.com", "One").with_text("1"),
        EmailMessage::new("good@x.com", "Two").with_text("2"),
    ];
    let results = SmtpClient::new(smtp_config(port))
        .send_batch(&messages)
        .await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[1].success);
    assert_ne!(results[0].message_id, results[1].message_id);

    let sent = server.await.unwrap();
    assert_eq!(sent[6], "RSET");
    assert_eq!(sent[7], "MAIL FROM:<me@example.com>");
    assert_eq!(sent.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_auth_failure_fails_every_message() {
    let (port, _server) = smtp_server(vec![
        EHLO_OK,
        "334 VXNlcm5hbWU6\r\n",
        "334 UGFzc3dvcmQ6\r\n",
        "535 5.7.8 authentication failed\r\n",
        "221 bye\r\n",
    ])
    .await;

    let messages = [
        EmailMessage::new("a@x.com", "One").with_text("1"),
        EmailMessage::new("b@x.com", "Two").with_text("2"),
    ];
    let results = SmtpClient::new(smtp_config(port))
        .send_batch(&messages)
        .await;
    assert!(results.iter().all(|r| !r.success));
    assert!(results[0].error.as_deref().unwrap().contains("535"));
}

#[tokio::test]
async fn test_unreachable_server() {
    let port = closed_port().await;
    let client = SmtpClient::new(smtp_config(port));

    let result = client
        .send(&EmailMessage::new("a@x.com", "Hi").with_text("x"))
        .await;
    assert!(!result.success);
    assert!(result.message_id.ends_with("@example.com>"));
    assert!(!client.verify().await);
}

#[tokio::test]
async fn test_verify() {
    let (port, server) = smtp_server(script(&["221 bye\r\n"])).await;
    assert!(SmtpClient::new(smtp_config(port)).verify().await);
    let sent = server.await.unwrap();
    assert_eq!(sent.last().map(String::as_str), Some("QUIT"));
}
