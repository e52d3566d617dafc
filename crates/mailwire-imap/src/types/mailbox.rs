//! Mailbox types.

use super::Flags;

/// State of a mailbox as reported by SELECT.
///
/// Valid only while the mailbox stays selected on the connection that
/// produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct MailboxInfo {
    /// Mailbox name as passed to SELECT.
    pub name: String,
    /// Flags defined for this mailbox (`* FLAGS`).
    pub flags: Flags,
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// `[UNSEEN n]`: sequence number of the first unseen message.
    pub unseen: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY epoch; UIDs only compare within one epoch.
    pub uid_validity: Option<u32>,
    /// True when the server granted `[READ-ONLY]` access.
    pub read_only: bool,
}

impl MailboxInfo {
    /// Creates an empty record for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One line of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct MailboxListing {
    /// Mailbox name.
    pub name: String,
    /// Hierarchy delimiter; `None` for a flat namespace.
    pub delimiter: Option<String>,
    /// Attributes such as `\HasChildren` or `\Noselect`.
    pub attributes: Vec<String>,
}

impl MailboxListing {
    /// Returns true unless the mailbox is marked `\Noselect` or
    /// `\NonExistent`.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|a| {
            a.eq_ignore_ascii_case("\\Noselect") || a.eq_ignore_ascii_case("\\NonExistent")
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

    #[test]
    fn mailbox_info_new() {
        let info = MailboxInfo::new("INBOX");
        assert_eq!(info.name, "INBOX");
        assert_eq!(info.exists, 0);
        assert!(info.uid_validity.is_none());
        assert!(info.flags.is_empty());
    }

    #[test]
    fn listing_selectable() {
        let mut listing = MailboxListing {
            name: "[Gmail]".to_string(),
            delimiter: Some("/".to_string()),
            attributes: vec!["\\HasChildren".to_string()],
        };
        assert!(listing.is_selectable());

        listing.attributes.push("\\NoSelect".to_string());
        assert!(!listing.is_selectable());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn mailbox_info_camel_case() {
        let info = MailboxInfo {
            uid_validity: Some(7),
            ..MailboxInfo::new("INBOX")
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["uidValidity"], 7);
        assert_eq!(json["readOnly"], false);
    }
}
