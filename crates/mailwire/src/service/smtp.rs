//! Per-call SMTP client.

use mailwire_mime::{EmailMessage, Mailbox, MessageBuilder};
use mailwire_smtp::{Address, SmtpConnection, SmtpStream};

use crate::config::SmtpConfig;
use crate::error::Result;
use crate::model::SendResult;

type Connection = SmtpConnection<SmtpStream>;

/// SMTP facade bound to one account.
#[derive(Debug, Clone)]
pub struct SmtpClient {
    config: SmtpConfig,
}

impl SmtpClient {
    /// Creates a client; no connection is made until a message is sent.
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Sends one message over a fresh connection.
    ///
    /// Never fails: errors are reported in the returned [`SendResult`],
    /// which always carries the Message-ID assigned before sending.
    pub async fn send(&self, message: &EmailMessage) -> SendResult {
        self.send_batch(std::slice::from_ref(message))
            .await
            .pop()
            .unwrap_or_else(|| SendResult::failed(String::new(), "nothing was sent"))
    }

    /// Sends every message over one connection, one mail transaction each.
    ///
    /// A rejected message is reset with RSET and the batch continues. If the
    /// connection cannot be opened or is lost, the remaining messages fail
    /// with that error.
    pub async fn send_batch(&self, messages: &[EmailMessage]) -> Vec<SendResult> {
        let mut results = Vec::with_capacity(messages.len());
        let mut session = self.open().await.map_err(|e| e.to_string());

        for message in messages {
            let sender = self.sender_for(message);
            let message_id = MessageBuilder::generate_message_id(&sender);

            let conn = match &mut session {
                Ok(conn) => conn,
                Err(reason) => {
                    results.push(SendResult::failed(message_id, reason.as_str()));
                    continue;
                }
            };

            match transact(conn, message, &sender, &message_id).await {
                Ok(response) => {
                    tracing::info!(message_id = %message_id, "message accepted");
                    results.push(SendResult::accepted(message_id, response));
                }
                Err(e) => {
                    tracing::warn!(message_id = %message_id, error = %e, "message not sent");
                    let reason = e.to_string();
                    results.push(SendResult::failed(message_id, &reason));
                    if let Err(e) = conn.rset().await {
                        session = Err(format!("connection lost after failed send: {e}"));
                    }
                }
            }
        }

        if let Ok(conn) = session {
            close(conn).await;
        }
        results
    }

    /// Checks that the server is reachable and accepts the credentials.
    pub async fn verify(&self) -> bool {
        match self.open().await {
            Ok(conn) => {
                close(conn).await;
                true
            }
            Err(e) => {
                tracing::warn!(host = %self.config.host, error = %e, "SMTP verification failed");
                false
            }
        }
    }

    /// Greeting, EHLO, STARTTLS when configured and offered, then AUTH LOGIN
    /// when a username is set.
    async fn open(&self) -> Result<Connection> {
        let mut conn = SmtpConnection::connect(&self.config.connection()).await?;
        if !self.config.username.is_empty()
            && let Err(e) = conn
                .auth_login(&self.config.username, &self.config.password)
                .await
        {
            close(conn).await;
            return Err(e.into());
        }
        Ok(conn)
    }

    fn sender_for(&self, message: &EmailMessage) -> Mailbox {
        message.from.clone().unwrap_or_else(|| self.config.sender())
    }
}

async fn transact(
    conn: &mut Connection,
    message: &EmailMessage,
    sender: &Mailbox,
    message_id: &str,
) -> Result<String> {
    let from = Address::new(sender.email.as_str())?;
    let recipients = message
        .envelope_recipients()
        .map(Address::new)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let payload = MessageBuilder::new(message, sender)
        .message_id(message_id)
        .build();
    let reply = conn.send(&from, &recipients, payload.as_bytes()).await?;
    Ok(reply.to_string())
}

async fn close(conn: Connection) {
    if let Err(e) = conn.quit().await {
        tracing::warn!(error = %e, "SMTP quit failed");
    }
}
