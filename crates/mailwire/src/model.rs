//! Caller-facing data returned by the facade clients.

use std::collections::HashMap;

use mailwire_imap::EmailHeader;
use serde::{Deserialize, Serialize};

/// Default number of messages per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Decoded content of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailBody {
    /// Message UID.
    pub uid: u32,
    /// Plain-text rendition.
    pub text: Option<String>,
    /// HTML rendition.
    pub html: Option<String>,
    /// Top-level headers, lower-cased names.
    pub headers: HashMap<String, String>,
}

/// Outcome of sending one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    /// True if the server accepted the message.
    pub success: bool,
    /// Message-ID assigned before sending.
    pub message_id: String,
    /// Final server reply on success.
    pub response: Option<String>,
    /// Error description on failure.
    pub error: Option<String>,
}

impl SendResult {
    pub(crate) fn accepted(message_id: String, response: String) -> Self {
        Self {
            success: true,
            message_id,
            response: Some(response),
            error: None,
        }
    }

    pub(crate) fn failed(message_id: String, error: impl ToString) -> Self {
        Self {
            success: false,
            message_id,
            response: None,
            error: Some(error.to_string()),
        }
    }
}

/// One page of a mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPage {
    /// Headers on this page, most recent first.
    pub emails: Vec<EmailHeader>,
    /// Number of matching messages across all pages.
    pub total: usize,
    /// One-based page number.
    pub page: usize,
    /// Requested page size.
    pub page_size: usize,
}

/// Paging and filtering for [`crate::ImapClient::list_emails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    /// One-based page number; 0 is treated as 1.
    pub page: usize,
    /// Messages per page; 0 is treated as the default.
    pub page_size: usize,
    /// Restrict the listing to the configured recipient allow-list.
    pub only_allowed: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            only_allowed: true,
        }
    }
}

impl ListOptions {
    /// Options for the given page with default size.
    #[must_use]
    pub fn page(page: usize) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    /// Normalized `(page, page_size)`.
    #[must_use]
    pub const fn bounds(&self) -> (usize, usize) {
        let page = if self.page == 0 { 1 } else { self.page };
        let size = if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        };
        (page, size)
    }

    /// The slice of `uids` this page covers.
    #[must_use]
    pub fn slice<'a>(&self, uids: &'a [u32]) -> &'a [u32] {
        let (page, size) = self.bounds();
        let start = (page - 1).saturating_mul(size).min(uids.len());
        let end = start.saturating_add(size).min(uids.len());
        &uids[start..end]
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
    fn test_page_slice() {
        let uids: Vec<u32> = (1..=45).rev().collect();
        let first = ListOptions::page(1).slice(&uids);
        assert_eq!(first.len(), 20);
        assert_eq!(first[0], 45);

        let last = ListOptions::page(3).slice(&uids);
        assert_eq!(last, &[5, 4, 3, 2, 1]);

        assert!(ListOptions::page(4).slice(&uids).is_empty());
        assert_eq!(ListOptions::page(0).slice(&uids)[0], 45);
    }

    #[test]
    fn test_zero_page_size_uses_default() {
        let options = ListOptions {
            page: 1,
            page_size: 0,
            only_allowed: false,
        };
        assert_eq!(options.bounds(), (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_send_result_json() {
        let result = SendResult::failed("<a@b>".into(), "SMTP error: boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["messageId"], "<a@b>");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "SMTP error: boom");
    }

    #[test]
    fn test_list_options_deserialize_defaults() {
        let options: ListOptions = serde_json::from_str(r#"{"page":2}"#).unwrap();
        assert_eq!(options.page, 2);
        assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
        assert!(options.only_allowed);
    }
}
