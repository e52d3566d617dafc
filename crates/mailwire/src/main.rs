//! `mailwire` command line: account settings come from the environment and
//! every result is printed as JSON.

use anyhow::{Context, bail};
use mailwire::{ImapClient, ImapConfig, ListOptions, SmtpClient, SmtpConfig};
use mailwire_mime::EmailMessage;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage: mailwire <command>

Commands:
  verify                     check IMAP and SMTP settings
  mailboxes                  list mailboxes
  list [MAILBOX] [PAGE]      list message headers (default INBOX, page 1)
  show MAILBOX UID           print one decoded message
  send TO SUBJECT TEXT       send a plain-text message

Settings are read from SMTP_* and IMAP_* environment variables.";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Verify,
    Mailboxes,
    List { mailbox: String, page: usize },
    Show { mailbox: String, uid: u32 },
    Send { to: String, subject: String, text: String },
    Help,
}

impl Command {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(match args.as_slice() {
            [] | ["help" | "-h" | "--help", ..] => Self::Help,
            ["verify"] => Self::Verify,
            ["mailboxes"] => Self::Mailboxes,
            ["list", rest @ ..] if rest.len() <= 2 => Self::List {
                mailbox: rest.first().copied().unwrap_or("INBOX").to_string(),
                page: rest
                    .get(1)
                    .map(|p| p.parse::<usize>())
                    .transpose()
                    .context("PAGE must be a number")?
                    .unwrap_or(1),
            },
            ["show", mailbox, uid] => Self::Show {
                mailbox: (*mailbox).to_string(),
                uid: uid.parse::<u32>().context("UID must be a number")?,
            },
            ["send", to, subject, text] => Self::Send {
                to: (*to).to_string(),
                subject: (*subject).to_string(),
                text: (*text).to_string(),
            },
            [other, ..] => bail!("unknown or malformed command: {other}\n\n{USAGE}"),
        })
    }
}

#[derive(Serialize)]
struct Verification {
    imap: bool,
    smtp: bool,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailwire=info,mailwire_imap=info,mailwire_smtp=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    tracing::debug!(?command, "starting");

    match command {
        Command::Help => println!("{USAGE}"),
        Command::Verify => {
            let imap = ImapClient::new(ImapConfig::from_env()?);
            let smtp = SmtpClient::new(SmtpConfig::from_env()?);
            let (imap, smtp) = tokio::join!(imap.verify(), smtp.verify());
            print_json(&Verification { imap, smtp })?;
        }
        Command::Mailboxes => {
            let client = ImapClient::new(ImapConfig::from_env()?);
            print_json(&client.list_mailboxes().await?)?;
        }
        Command::List { mailbox, page } => {
            let client = ImapClient::new(ImapConfig::from_env()?);
            print_json(&client.list_emails(&mailbox, ListOptions::page(page)).await?)?;
        }
        Command::Show { mailbox, uid } => {
            let client = ImapClient::new(ImapConfig::from_env()?);
            match client.fetch_email(&mailbox, uid).await? {
                Some(body) => print_json(&body)?,
                None => bail!("no message with UID {uid} in {mailbox}"),
            }
        }
        Command::Send { to, subject, text } => {
            let client = SmtpClient::new(SmtpConfig::from_env()?);
            let result = client
                .send(&EmailMessage::new(to, subject).with_text(text))
                .await;
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
    }
    Ok(())
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

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        Command::parse(&args)
    }

    #[test]
    fn test_parse_list_defaults() {
        assert_eq!(
            parse(&["list"]).unwrap(),
            Command::List {
                mailbox: "INBOX".into(),
                page: 1
            }
        );
        assert_eq!(
            parse(&["list", "Archive", "3"]).unwrap(),
            Command::List {
                mailbox: "Archive".into(),
                page: 3
            }
        );
    }

    #[test]
    fn test_parse_show_and_send() {
        assert_eq!(
            parse(&["show", "INBOX", "42"]).unwrap(),
            Command::Show {
                mailbox: "INBOX".into(),
                uid: 42
            }
        );
        assert!(matches!(
            parse(&["send", "a@x.com", "Hi", "body"]).unwrap(),
            Command::Send { .. }
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["show", "INBOX", "abc"]).is_err());
        assert!(parse(&["list", "INBOX", "x"]).is_err());
        assert!(parse(&["send", "a@x.com"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert_eq!(parse(&[]).unwrap(), Command::Help);
    }
}
