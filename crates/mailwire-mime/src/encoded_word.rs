//! RFC 2047 encoded words (`=?charset?B|Q?text?=`).
//!
//! Decoding never fails: a word that cannot be decoded is kept verbatim, so
//! a malformed subject or display name degrades to its raw form instead of
//! aborting a mailbox listing.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::encoding::{decode_charset, decode_quoted_printable_bytes, encode_base64};

/// Some mailers drop the `=` padding inside encoded words.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Raw bytes per encoded word when encoding; 45 bytes of input keep each
/// word under the 75 character limit.
const ENCODE_CHUNK: usize = 45;

/// Decodes every encoded word found in `text`.
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// requires. Text outside encoded words is copied unchanged.
#[must_use]
pub fn decode_words(text: &str) -> String {
    if !text.contains("=?") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let before = &rest[..start];
        let candidate = &rest[start..];

        match split_word(candidate) {
            Some((word, len)) => {
                let decoded = decode_word(word);
                let joined = after_word && before.chars().all(char::is_whitespace);
                if !joined {
                    out.push_str(before);
                }
                match decoded {
                    Some(decoded) => {
                        out.push_str(&decoded);
                        after_word = true;
                    }
                    None => {
                        out.push_str(word);
                        after_word = false;
                    }
                }
                rest = &candidate[len..];
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decodes a single encoded word.
///
/// Returns `None` when `word` is not a well-formed encoded word or its
/// payload cannot be decoded.
#[must_use]
pub fn decode_word(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut fields = inner.splitn(3, '?');
    let charset = fields.next()?;
    let encoding = fields.next()?;
    let payload = fields.next()?;

    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => LENIENT_BASE64.decode(payload).ok()?,
        "Q" | "q" => {
            let spaced = payload.replace('_', " ");
            decode_quoted_printable_bytes(spaced.as_bytes()).ok()?
        }
        _ => return None,
    };

    Some(decode_charset(&bytes, Some(charset)))
}

/// Encodes a header value for transmission.
///
/// ASCII text passes through unchanged; anything else becomes one or more
/// UTF-8 Base64 encoded words, folded onto continuation lines.
#[must_use]
pub fn encode_header_value(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_end = 0;
    for (idx, ch) in text.char_indices() {
        let next = idx + ch.len_utf8();
        if next - chunk_start > ENCODE_CHUNK && chunk_end > chunk_start {
            words.push(&text[chunk_start..chunk_end]);
            chunk_start = chunk_end;
        }
        chunk_end = next;
    }
    if chunk_end > chunk_start {
        words.push(&text[chunk_start..chunk_end]);
    }

    words
        .iter()
        .map(|chunk| format!("=?UTF-8?B?{}?=", encode_base64(chunk.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Locates the extent of an encoded word at the start of `s`.
///
/// Returns the word and its byte length.
fn split_word(s: &str) -> Option<(&str, usize)> {
    let body = s.strip_prefix("=?")?;
    let charset_end = body.find('?')?;
    let after_charset = &body[charset_end + 1..];
    let encoding_end = after_charset.find('?')?;
    let payload = &after_charset[encoding_end + 1..];
    let payload_end = payload.find("?=")?;

    let len = 2 + charset_end + 1 + encoding_end + 1 + payload_end + 2;
    let word = &s[..len];
    if word.chars().any(char::is_whitespace) {
        return None;
    }
    Some((word, len))
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
    fn test_plain_text_untouched() {
        assert_eq!(decode_words("Hello World"), "Hello World");
        assert_eq!(decode_words("a =? b"), "a =? b");
    }

    #[test]
    fn test_decode_base64_word() {
        assert_eq!(decode_words("=?UTF-8?B?UsOpc3Vtw6k=?="), "Résumé");
        assert_eq!(decode_words("=?utf-8?b?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_decode_unpadded_base64_word() {
        assert_eq!(decode_words("=?UTF-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_words("=?UTF-8?B?SGk?="), "Hi");
    }

    #[test]
    fn test_decode_q_word() {
        assert_eq!(decode_words("=?utf-8?Q?H=C3=A9llo_World?="), "Héllo World");
        assert_eq!(
            decode_words("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?="),
            "Keld Jørn Simonsen"
        );
    }

    #[test]
    fn test_latin1_fallback_for_bad_utf8() {
        // 0xE9 alone is not UTF-8
        assert_eq!(decode_words("=?UTF-8?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_adjacent_words_joined() {
        assert_eq!(
            decode_words("=?UTF-8?Q?Hello_?= =?UTF-8?Q?World?="),
            "Hello World"
        );
        assert_eq!(decode_words("=?UTF-8?Q?a?=\r\n =?UTF-8?Q?b?="), "ab");
    }

    #[test]
    fn test_mixed_text_and_words() {
        assert_eq!(
            decode_words("Re: =?UTF-8?B?UsOpc3Vtw6k=?= attached"),
            "Re: Résumé attached"
        );
    }

    #[test]
    fn test_undecodable_word_kept_verbatim() {
        assert_eq!(decode_words("=?UTF-8?B?!!!?="), "=?UTF-8?B?!!!?=");
        assert_eq!(decode_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
        assert_eq!(decode_words("=?UTF-8?Q?bad=ZZ?="), "=?UTF-8?Q?bad=ZZ?=");
    }

    #[test]
    fn test_encode_ascii_passthrough() {
        assert_eq!(encode_header_value("Plain subject?"), "Plain subject?");
    }

    #[test]
    fn test_encode_non_ascii() {
        let encoded = encode_header_value("Résumé");
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert!(encoded.ends_with("?="));
        assert_eq!(decode_words(&encoded), "Résumé");
    }

    #[test]
    fn test_encode_long_value_folds() {
        let text = "Ünïcödé subject line that goes on and on ".repeat(4);
        let encoded = encode_header_value(&text);
        assert!(encoded.contains("\r\n "));
        for word in encoded.split("\r\n ") {
            assert!(word.len() <= 75, "word too long: {}", word.len());
        }
        assert_eq!(decode_words(&encoded), text);
    }
}
