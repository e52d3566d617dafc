//! Full submission dialogues against scripted servers.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

use mailwire_smtp::{Address, Error, SmtpConnection, StartTls};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Scripted stream whose TLS upgrade only flips a flag.
struct ScriptedStream {
    inner: Mock,
    tls: bool,
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

    async fn start_tls(self, _host: &str, _timeout: Duration) -> mailwire_smtp::Result<Self> {
        Ok(Self {
            inner: self.inner,
            tls: true,
        })
    }
}

fn plain(mock: Mock) -> ScriptedStream {
    ScriptedStream {
        inner: mock,
        tls: false,
    }
}

#[tokio::test]
async fn test_starttls_then_auth_and_send() {
    let mock = Builder::new()
        .read(b"220 smtp.example.com ESMTP\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-smtp.example.com\r\n250-PIPELINING\r\n250 STARTTLS\r\n")
        .write(b"STARTTLS\r\n")
        .read(b"220 2.0.0 Ready to start TLS\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-smtp.example.com\r\n250 AUTH LOGIN PLAIN\r\n")
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(b"dXNlckBleGFtcGxlLmNvbQ==\r\n")
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(b"cHc=\r\n")
        .read(b"235 ok\r\n")
        .write(b"MAIL FROM:<user@example.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"RCPT TO:<a@x.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"DATA\r\n")
        .read(b"354 end with .\r\n")
        .write(b"Subject: hi\r\n\r\nbody\r\n.\r\n")
        .read(b"250 queued\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 bye\r\n")
        .build();

    let mut conn = SmtpConnection::from_stream(plain(mock), TIMEOUT)
        .await
        .unwrap();
    conn.ehlo("localhost").await.unwrap();
    let mut conn = conn.starttls_if_offered("smtp.example.com").await.unwrap();
    assert!(conn.is_tls());
    assert!(!conn.server_info().supports_starttls());

    conn.auth_login("user@example.com", "pw").await.unwrap();
    let from = Address::new("user@example.com").unwrap();
    let to = [Address::new("a@x.com").unwrap()];
    conn.send(&from, &to, b"Subject: hi\r\n\r\nbody\r\n")
        .await
        .unwrap();
    conn.quit().await.unwrap();
}

#[tokio::test]
async fn test_starttls_skipped_when_not_offered() {
    let mock = Builder::new()
        .read(b"220 mx ESMTP\r\n")
        .write(b"EHLO client.example.com\r\n")
        .read(b"250-mx\r\n250 AUTH LOGIN\r\n")
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(b"dQ==\r\n")
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(b"cA==\r\n")
        .read(b"235 ok\r\n")
        .build();

    let mut conn = SmtpConnection::from_stream(plain(mock), TIMEOUT)
        .await
        .unwrap();
    conn.ehlo("client.example.com").await.unwrap();
    let mut conn = conn.starttls_if_offered("mx").await.unwrap();
    assert!(!conn.is_tls());
    conn.auth_login("u", "p").await.unwrap();
}

#[tokio::test]
async fn test_starttls_refused() {
    let mock = Builder::new()
        .read(b"220 mx\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-mx\r\n250 STARTTLS\r\n")
        .write(b"STARTTLS\r\n")
        .read(b"454 4.7.0 TLS not available\r\n")
        .build();

    let mut conn = SmtpConnection::from_stream(plain(mock), TIMEOUT)
        .await
        .unwrap();
    conn.ehlo("localhost").await.unwrap();
    let err = conn.starttls_if_offered("mx").await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedReply {
            expected: 220,
            code: 454,
            ..
        }
    ));
}

#[tokio::test]
async fn test_starttls_rejects_injected_plaintext() {
    let mock = Builder::new()
        .read(b"220 mx\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-mx\r\n250 STARTTLS\r\n")
        .write(b"STARTTLS\r\n")
        .read(b"220 go\r\n250 injected\r\n")
        .build();

    let mut conn = SmtpConnection::from_stream(plain(mock), TIMEOUT)
        .await
        .unwrap();
    conn.ehlo("localhost").await.unwrap();
    assert!(matches!(
        conn.starttls_if_offered("mx").await,
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn test_starttls_requires_ehlo() {
    let mock = Builder::new().read(b"220 mx\r\n").build();
    let conn = SmtpConnection::from_stream(plain(mock), TIMEOUT)
        .await
        .unwrap();
    assert!(matches!(
        conn.starttls_if_offered("mx").await,
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn test_two_transactions_on_one_connection() {
    let mock = Builder::new()
        .read(b"220 mx\r\n")
        .write(b"MAIL FROM:<me@x.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"RCPT TO:<a@y.com>\r\n")
        .read(b"550 no\r\n")
        .write(b"RSET\r\n")
        .read(b"250 ok\r\n")
        .write(b"MAIL FROM:<me@x.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"RCPT TO:<b@y.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go\r\n")
        .write(b"x\r\n.\r\n")
        .read(b"250 ok\r\n")
        .build();

    let mut conn = SmtpConnection::from_stream(mock, TIMEOUT).await.unwrap();
    let from = Address::new("me@x.com").unwrap();

    let first = conn
        .send(&from, &[Address::new("a@y.com").unwrap()], b"x")
        .await;
    assert!(matches!(first, Err(Error::RecipientRejected { code: 550, .. })));
    conn.rset().await.unwrap();

    conn.send(&from, &[Address::new("b@y.com").unwrap()], b"x")
        .await
        .unwrap();
    assert_eq!(conn.commands_sent(), 6);
}
