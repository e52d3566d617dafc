//! Scripted fake IMAP and SMTP servers on loopback sockets.
//!
//! Each server accepts one connection, answers every client unit with the
//! next scripted response and returns everything the client sent.

#![allow(dead_code, clippy::unwrap_used)]

use mailwire::{ImapConfig, Security, SmtpConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Scripted IMAP server. `{tag}` in a response is replaced by the tag of
/// the command it answers.
pub async fn imap_server(responses: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"* OK fake IMAP ready\r\n").await.unwrap();

        let mut received = Vec::new();
        for response in responses {
            let Ok(Some(line)) = lines.next_line().await else {
                return received;
            };
            let tag = line.split(' ').next().unwrap_or_default().to_string();
            received.push(line);
            if write
                .write_all(response.replace("{tag}", &tag).as_bytes())
                .await
                .is_err()
            {
                return received;
            }
        }
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(line);
        }
        received
    });

    (port, handle)
}

/// Scripted SMTP server. After a `354` response the whole message up to
/// and including the terminating `.` line is one received unit.
pub async fn smtp_server(responses: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"220 fake ESMTP\r\n").await.unwrap();

        let mut received = Vec::new();
        let mut in_data = false;
        for response in responses {
            let unit = if in_data {
                let mut payload = Vec::new();
                loop {
                    let Ok(Some(line)) = lines.next_line().await else {
                        return received;
                    };
                    let done = line == ".";
                    payload.push(line);
                    if done {
                        break;
                    }
                }
                payload.join("\r\n")
            } else {
                let Ok(Some(line)) = lines.next_line().await else {
                    return received;
                };
                line
            };
            received.push(unit);
            if write.write_all(response.as_bytes()).await.is_err() {
                return received;
            }
            in_data = response.starts_with("354");
        }
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(line);
        }
        received
    });

    (port, handle)
}

/// Port with nothing listening.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn imap_config(port: u16, allowed: &[&str]) -> ImapConfig {
    ImapConfig {
        host: "127.0.0.1".into(),
        port,
        security: Security::None,
        username: "user".into(),
        password: "pass".into(),
        allowed_recipients: allowed.iter().map(ToString::to_string).collect(),
        timeout_secs: 5,
    }
}

pub fn smtp_config(port: u16) -> SmtpConfig {
    SmtpConfig {
        host: "127.0.0.1".into(),
        port,
        security: Security::None,
        username: "me@example.com".into(),
        password: "pw".into(),
        from_name: Some("Me".into()),
        from_email: "me@example.com".into(),
        ehlo_name: "localhost".into(),
        timeout_secs: 5,
    }
}

pub const LOGIN_OK: &str = "{tag} OK LOGIN completed\r\n";
pub const SELECT_OK: &str =
    "* 3 EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 1] ok\r\n{tag} OK [READ-WRITE] SELECT completed\r\n";
pub const LOGOUT_OK: &str = "* BYE logging out\r\n{tag} OK LOGOUT completed\r\n";

pub const EHLO_OK: &str = "250-fake\r\n250 AUTH LOGIN PLAIN\r\n";
pub const AUTH_OK: [&str; 3] = ["334 VXNlcm5hbWU6\r\n", "334 UGFzc3dvcmQ6\r\n", "235 ok\r\n"];
