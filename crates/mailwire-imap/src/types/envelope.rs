//! Message summary types: envelope, addresses and header records.

use super::Flags;

/// A parsed address from an envelope address list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmailAddress {
    /// Display name, RFC 2047 decoded; empty when absent.
    pub name: String,
    /// `mailbox@host`.
    pub email: String,
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

/// IMAP's structured summary of a message.
///
/// Every field may be absent when the server sent NIL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct EmailEnvelope {
    /// Date header, verbatim.
    pub date: Option<String>,
    /// Subject, RFC 2047 decoded.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Option<Vec<EmailAddress>>,
    /// Sender addresses.
    pub sender: Option<Vec<EmailAddress>>,
    /// Reply-To addresses.
    pub reply_to: Option<Vec<EmailAddress>>,
    /// To addresses.
    pub to: Option<Vec<EmailAddress>>,
    /// Cc addresses.
    pub cc: Option<Vec<EmailAddress>>,
    /// Bcc addresses.
    pub bcc: Option<Vec<EmailAddress>>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Summary of one message in a mailbox listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct EmailHeader {
    /// Unique identifier within the mailbox's UIDVALIDITY epoch.
    pub uid: u32,
    /// Message flags.
    pub flags: Flags,
    /// Parsed envelope.
    pub envelope: EmailEnvelope,
    /// RFC822.SIZE in bytes.
    pub size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display() {
        let bare = EmailAddress {
            name: String::new(),
            email: "a@x.com".to_string(),
        };
        assert_eq!(bare.to_string(), "a@x.com");

        let named = EmailAddress {
            name: "Ann".to_string(),
            email: "a@x.com".to_string(),
        };
        assert_eq!(named.to_string(), "Ann <a@x.com>");
    }
}
