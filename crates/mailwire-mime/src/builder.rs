//! Outbound message composition (RFC 5322 + MIME).

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::body::TransferEncoding;
use crate::content_type::ContentType;
use crate::encoded_word::encode_header_value;
use crate::encoding::{encode_base64_wrapped, encode_quoted_printable};

/// One or more recipient addresses.
///
/// Deserializes from either a single string or a list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "OneOrMany")
)]
pub struct Recipients(Vec<String>);

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[cfg(feature = "serde")]
impl From<OneOrMany> for Recipients {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(address) => Self::from(address),
            OneOrMany::Many(addresses) => Self::from(addresses),
        }
    }
}

impl Recipients {
    /// Creates an empty recipient list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an address.
    pub fn push(&mut self, address: impl Into<String>) {
        self.0.push(address.into());
    }

    /// Returns the addresses.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Iterates over the addresses.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Returns the number of addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Self(vec![address.to_string()])
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Self(vec![address])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Self(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        Self(addresses.into_iter().map(str::to_string).collect())
    }
}

impl<'a> IntoIterator for &'a Recipients {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A sender mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mailbox {
    /// Display name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    /// Address (`local@domain`).
    pub email: String,
}

impl Mailbox {
    /// Creates a mailbox without display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }

    /// Returns the domain part of the address, if any.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>'))
            .filter(|domain| !domain.is_empty())
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(name) = self.name.as_deref() else {
            return f.write_str(&self.email);
        };
        if !name.is_ascii() {
            return write!(f, "{} <{}>", encode_header_value(name), self.email);
        }
        if name.contains(|c: char| "()<>[]:;@\\,.\"".contains(c)) {
            let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
            return write!(f, "\"{escaped}\" <{}>", self.email);
        }
        write!(f, "{name} <{}>", self.email)
    }
}

/// A file attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// An outbound message as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase", default)
)]
pub struct EmailMessage {
    /// Primary recipients.
    pub to: Recipients,
    /// Carbon-copy recipients.
    pub cc: Recipients,
    /// Blind carbon-copy recipients; never written to the headers.
    pub bcc: Recipients,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Reply-To address.
    pub reply_to: Option<String>,
    /// Message-ID this message replies to.
    pub in_reply_to: Option<String>,
    /// Thread references.
    pub references: Option<String>,
    /// Extra header fields.
    pub headers: BTreeMap<String, String>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Sender override; the client default is used when absent.
    pub from: Option<Mailbox>,
}

impl EmailMessage {
    /// Creates a message with recipients and subject.
    #[must_use]
    pub fn new(to: impl Into<Recipients>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Sets the Cc recipients.
    #[must_use]
    pub fn with_cc(mut self, cc: impl Into<Recipients>) -> Self {
        self.cc = cc.into();
        self
    }

    /// Sets the Bcc recipients.
    #[must_use]
    pub fn with_bcc(mut self, bcc: impl Into<Recipients>) -> Self {
        self.bcc = bcc.into();
        self
    }

    /// Sets the Reply-To address.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Marks the message as a reply in a thread.
    #[must_use]
    pub fn with_in_reply_to(mut self, message_id: impl Into<String>, references: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self.references = Some(references.into());
        self
    }

    /// Adds a custom header field.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Overrides the sender.
    #[must_use]
    pub fn with_from(mut self, from: Mailbox) -> Self {
        self.from = Some(from);
        self
    }

    /// Every envelope recipient: To, then Cc, then Bcc.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }
}

/// Renders an [`EmailMessage`] into RFC 5322 wire text with CRLF line
/// endings, ready for the SMTP `DATA` phase.
#[derive(Debug)]
pub struct MessageBuilder<'a> {
    message: &'a EmailMessage,
    from: &'a Mailbox,
    message_id: Option<String>,
    date: Option<DateTime<FixedOffset>>,
}

impl<'a> MessageBuilder<'a> {
    /// Creates a builder for `message` sent by `from`.
    #[must_use]
    pub const fn new(message: &'a EmailMessage, from: &'a Mailbox) -> Self {
        Self {
            message,
            from,
            message_id: None,
            date: None,
        }
    }

    /// Generates a Message-ID of the form `<uuid@domain-of-sender>`.
    #[must_use]
    pub fn generate_message_id(from: &Mailbox) -> String {
        format!(
            "<{}@{}>",
            Uuid::new_v4(),
            from.domain().unwrap_or("localhost")
        )
    }

    /// Uses the given Message-ID instead of generating one.
    #[must_use]
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Uses the given Date instead of the current time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Builds the message text.
    #[must_use]
    pub fn build(self) -> String {
        let msg = self.message;
        let mut out = String::new();

        let message_id = self
            .message_id
            .unwrap_or_else(|| Self::generate_message_id(self.from));
        let date = self.date.unwrap_or_else(|| Utc::now().fixed_offset());

        let from = Mailbox {
            name: self.from.name.as_deref().map(|n| flatten(n).into_owned()),
            email: flatten(&self.from.email).into_owned(),
        };

        push_header(&mut out, "Message-ID", &message_id);
        push_header(&mut out, "Date", &date.to_rfc2822());
        push_folded(&mut out, "From", &from.to_string());
        if !msg.to.is_empty() {
            push_header(&mut out, "To", &msg.to.as_slice().join(", "));
        }
        if !msg.cc.is_empty() {
            push_header(&mut out, "Cc", &msg.cc.as_slice().join(", "));
        }
        if let Some(reply_to) = &msg.reply_to {
            push_header(&mut out, "Reply-To", reply_to);
        }
        if let Some(in_reply_to) = &msg.in_reply_to {
            push_header(&mut out, "In-Reply-To", in_reply_to);
        }
        if let Some(references) = &msg.references {
            push_header(&mut out, "References", references);
        }
        push_folded(
            &mut out,
            "Subject",
            &encode_header_value(&flatten(&msg.subject)),
        );
        push_header(&mut out, "MIME-Version", "1.0");
        for (name, value) in &msg.headers {
            push_header(&mut out, &flatten(name), value);
        }

        body_entity(msg).render(&mut out);
        out
    }
}

/// A MIME entity: its own header fields plus an already-encoded body.
struct Entity {
    content_type: ContentType,
    transfer_encoding: Option<TransferEncoding>,
    disposition: Option<String>,
    body: String,
}

impl Entity {
    fn text(content: &str, content_type: ContentType) -> Self {
        Self {
            content_type,
            transfer_encoding: Some(TransferEncoding::QuotedPrintable),
            disposition: None,
            body: encode_quoted_printable(content),
        }
    }

    fn attachment(attachment: &Attachment) -> Self {
        let filename = encode_header_value(&attachment.filename);
        let content_type = ContentType::parse(&attachment.content_type)
            .unwrap_or_else(|_| ContentType::new("application", "octet-stream"))
            .with_parameter("name", filename.clone());
        Self {
            content_type,
            transfer_encoding: Some(TransferEncoding::Base64),
            disposition: Some(format!("attachment; filename=\"{filename}\"")),
            body: encode_base64_wrapped(&attachment.content),
        }
    }

    fn multipart(content_type: ContentType, parts: Vec<Self>) -> Self {
        let boundary = content_type.boundary().unwrap_or_default().to_string();
        let mut body = String::new();
        for part in parts {
            body.push_str("--");
            body.push_str(&boundary);
            body.push_str("\r\n");
            part.render(&mut body);
            body.push_str("\r\n");
        }
        body.push_str("--");
        body.push_str(&boundary);
        body.push_str("--\r\n");
        Self {
            content_type,
            transfer_encoding: None,
            disposition: None,
            body,
        }
    }

    fn render(self, out: &mut String) {
        push_header(out, "Content-Type", &self.content_type.to_string());
        if let Some(encoding) = self.transfer_encoding {
            push_header(out, "Content-Transfer-Encoding", &encoding.to_string());
        }
        if let Some(disposition) = &self.disposition {
            push_header(out, "Content-Disposition", disposition);
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
    }
}

fn body_entity(msg: &EmailMessage) -> Entity {
    let main = match (&msg.text, &msg.html) {
        (Some(text), Some(html)) => Entity::multipart(
            ContentType::multipart_alternative(new_boundary()),
            vec![
                Entity::text(text, ContentType::text_plain()),
                Entity::text(html, ContentType::text_html()),
            ],
        ),
        (None, Some(html)) => Entity::text(html, ContentType::text_html()),
        (Some(text), None) => Entity::text(text, ContentType::text_plain()),
        (None, None) => Entity::text("", ContentType::text_plain()),
    };

    if msg.attachments.is_empty() {
        return main;
    }

    let mut parts = Vec::with_capacity(msg.attachments.len() + 1);
    parts.push(main);
    parts.extend(msg.attachments.iter().map(Entity::attachment));
    Entity::multipart(ContentType::multipart_mixed(new_boundary()), parts)
}

fn new_boundary() -> String {
    format!("----=_Part_{}", Uuid::new_v4().simple())
}

/// Appends `Name: value\r\n`, flattening CR and LF inside the value so it
/// cannot start a new header field.
fn push_header(out: &mut String, name: &str, value: &str) {
    push_folded(out, name, &flatten(value));
}

/// Appends a header whose value is already safe (possibly folded).
fn push_folded(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        Cow::Owned(value.replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(value)
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
    use crate::body::parse_body;
    use crate::encoded_word::decode_words;

    fn sender() -> Mailbox {
        Mailbox::new("me@example.com").with_name("Me")
    }

    fn build(message: &EmailMessage) -> String {
        let from = message.from.clone().unwrap_or_else(sender);
        MessageBuilder::new(message, &from)
            .message_id("<fixed@example.com>")
            .build()
    }

    fn split(raw: &str) -> (&str, &str) {
        let idx = raw.find("\r\n\r\n").unwrap();
        (&raw[..idx + 2], &raw[idx + 4..])
    }

    #[test]
    fn test_recipients_conversions() {
        assert_eq!(Recipients::from("a@x.com").as_slice(), ["a@x.com"]);
        assert_eq!(Recipients::from(vec!["a@x.com", "b@x.com"]).len(), 2);
        assert!(Recipients::new().is_empty());
    }

    #[test]
    fn test_envelope_recipients_include_bcc() {
        let msg = EmailMessage::new("a@x.com", "s")
            .with_cc("c@x.com")
            .with_bcc(vec!["b@x.com", "d@x.com"]);
        let all: Vec<_> = msg.envelope_recipients().collect();
        assert_eq!(all, vec!["a@x.com", "c@x.com", "b@x.com", "d@x.com"]);
    }

    #[test]
    fn test_mailbox_display() {
        assert_eq!(Mailbox::new("a@x.com").to_string(), "a@x.com");
        assert_eq!(sender().to_string(), "Me <me@example.com>");
        assert_eq!(
            Mailbox::new("a@x.com").with_name("Doe, John").to_string(),
            "\"Doe, John\" <a@x.com>"
        );
        let encoded = Mailbox::new("a@x.com").with_name("Zoë").to_string();
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert!(encoded.ends_with(" <a@x.com>"));
    }

    #[test]
    fn test_mailbox_domain() {
        assert_eq!(sender().domain(), Some("example.com"));
        assert_eq!(Mailbox::new("nobody").domain(), None);
    }

    #[test]
    fn test_generated_message_id_uses_sender_domain() {
        let id = MessageBuilder::generate_message_id(&sender());
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
        assert_ne!(id, MessageBuilder::generate_message_id(&sender()));

        let fallback = MessageBuilder::generate_message_id(&Mailbox::new("nobody"));
        assert!(fallback.ends_with("@localhost>"));
    }

    #[test]
    fn test_plain_message_headers() {
        let msg = EmailMessage::new(vec!["a@x.com", "b@x.com"], "Hello")
            .with_cc("c@x.com")
            .with_bcc("hidden@x.com")
            .with_text("body");
        let raw = build(&msg);
        let (header, body) = split(&raw);

        assert!(header.starts_with("Message-ID: <fixed@example.com>\r\n"));
        assert!(header.contains("\r\nDate: "));
        assert!(header.contains("From: Me <me@example.com>\r\n"));
        assert!(header.contains("To: a@x.com, b@x.com\r\n"));
        assert!(header.contains("Cc: c@x.com\r\n"));
        assert!(!raw.contains("hidden@x.com"));
        assert!(header.contains("Subject: Hello\r\n"));
        assert!(header.contains("MIME-Version: 1.0\r\n"));
        assert!(header.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(header.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_fixed_date() {
        let date = DateTime::parse_from_rfc2822("Tue, 1 Jul 2025 10:52:37 +0200").unwrap();
        let msg = EmailMessage::new("a@x.com", "s").with_text("t");
        let raw = MessageBuilder::new(&msg, &sender()).date(date).build();
        assert!(raw.contains("Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n"));
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let msg = EmailMessage::new("a@x.com", "Résumé").with_text("body");
        let raw = build(&msg);
        let subject = raw
            .lines()
            .find_map(|l| l.strip_prefix("Subject: "))
            .unwrap();
        assert!(subject.starts_with("=?UTF-8?B?"));
        assert_eq!(decode_words(subject), "Résumé");
    }

    #[test]
    fn test_threading_and_custom_headers() {
        let msg = EmailMessage::new("a@x.com", "Re: s")
            .with_text("t")
            .with_reply_to("replies@example.com")
            .with_in_reply_to("<parent@x.com>", "<root@x.com> <parent@x.com>")
            .with_header("X-Mailer", "mailwire");
        let raw = build(&msg);
        assert!(raw.contains("Reply-To: replies@example.com\r\n"));
        assert!(raw.contains("In-Reply-To: <parent@x.com>\r\n"));
        assert!(raw.contains("References: <root@x.com> <parent@x.com>\r\n"));
        assert!(raw.contains("X-Mailer: mailwire\r\n"));
    }

    #[test]
    fn test_header_injection_flattened() {
        let msg = EmailMessage::new("a@x.com", "s")
            .with_text("t")
            .with_header("X-Note", "one\r\nBcc: evil@x.com");
        let raw = build(&msg);
        assert!(raw.contains("X-Note: one  Bcc: evil@x.com\r\n"));
        assert!(!raw.contains("\r\nBcc:"));
    }

    #[test]
    fn test_html_only() {
        let msg = EmailMessage::new("a@x.com", "s").with_html("<p>Hi</p>");
        let raw = build(&msg);
        let (header, body) = split(&raw);
        assert!(header.contains("Content-Type: text/html; charset=utf-8\r\n"));
        let parts = parse_body(header.as_bytes(), body.as_bytes());
        assert_eq!(parts.html.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(parts.text, None);
    }

    #[test]
    fn test_alternative_parses_back() {
        let msg = EmailMessage::new("a@x.com", "s")
            .with_text("Grüße aus Köln\r\nZeile 2")
            .with_html("<p>Grüße</p>");
        let raw = build(&msg);
        let (header, body) = split(&raw);
        assert!(header.contains("Content-Type: multipart/alternative; boundary="));

        // plain first, then HTML
        let plain_at = body.find("text/plain").unwrap();
        let html_at = body.find("text/html").unwrap();
        assert!(plain_at < html_at);

        let parts = parse_body(header.as_bytes(), body.as_bytes());
        assert_eq!(parts.text.as_deref(), Some("Grüße aus Köln\r\nZeile 2"));
        assert_eq!(parts.html.as_deref(), Some("<p>Grüße</p>"));
    }

    #[test]
    fn test_attachments_wrap_in_mixed() {
        let content: Vec<u8> = (0..=255u8).cycle().take(400).collect();
        let msg = EmailMessage::new("a@x.com", "files")
            .with_text("see attached")
            .with_html("<p>see attached</p>")
            .with_attachment(Attachment::new("data.bin", "application/octet-stream", content))
            .with_attachment(Attachment::new("café.txt", "text/plain", b"hi".to_vec()));
        let raw = build(&msg);
        let (header, body) = split(&raw);

        assert!(header.contains("Content-Type: multipart/mixed; boundary="));
        assert!(body.contains("Content-Type: multipart/alternative; boundary="));
        assert_eq!(body.matches("Content-Disposition: attachment;").count(), 2);
        assert!(body.contains("filename=\"data.bin\""));
        assert!(body.contains("filename=\"=?UTF-8?B?"));
        assert!(body.contains("Content-Transfer-Encoding: base64\r\n"));
        for line in raw.split("\r\n") {
            assert!(line.len() <= 998);
        }

        let parts = parse_body(header.as_bytes(), body.as_bytes());
        assert_eq!(parts.text.as_deref(), Some("see attached"));
        assert_eq!(parts.html.as_deref(), Some("<p>see attached</p>"));
    }

    #[test]
    fn test_attachment_base64_lines() {
        let msg = EmailMessage::new("a@x.com", "f")
            .with_text("t")
            .with_attachment(Attachment::new("big.bin", "bogus", vec![7u8; 1000]));
        let raw = build(&msg);
        assert!(raw.contains("Content-Type: application/octet-stream; name=big.bin"));

        let start = raw.find("Content-Transfer-Encoding: base64\r\n").unwrap();
        let encoded = &raw[start..];
        let encoded = &encoded[encoded.find("\r\n\r\n").unwrap() + 4..];
        let lines: Vec<_> = encoded.split("\r\n").take_while(|l| !l.starts_with("--")).collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 76));
    }
}
