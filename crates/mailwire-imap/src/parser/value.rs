//! Generic parenthesized-value reader.
//!
//! FETCH data, ENVELOPE and address lists are all nested lists of atoms,
//! strings and NILs. They are read into a [`Value`] tree first and
//! interpreted afterwards, so one malformed field cannot desynchronise the
//! fields after it.

use super::lexer::{Lexer, Token};
use crate::Result;

/// Maximum list nesting accepted from the server.
pub const MAX_DEPTH: usize = 32;

/// A parsed IMAP data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    /// `NIL`.
    Nil,
    /// Number.
    Number(u32),
    /// Atom, including any attached section such as `BODY[TEXT]`.
    Atom(String),
    /// Quoted string.
    Quoted(String),
    /// Literal payload.
    Literal(&'a [u8]),
    /// Parenthesized list.
    List(Vec<Value<'a>>),
}

impl Value<'_> {
    /// Returns the value as text: quoted strings, literals, atoms and
    /// numbers. `NIL` and lists yield `None`.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Quoted(s) | Self::Atom(s) => Some(s.clone()),
            Self::Literal(bytes) => Some(mailwire_mime::encoding::decode_charset(bytes, None)),
            Self::Number(n) => Some(n.to_string()),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Returns the raw bytes of a string value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Quoted(s) => Some(s.as_bytes()),
            Self::Literal(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the number, also accepting numeric atoms and strings.
    #[must_use]
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Atom(s) | Self::Quoted(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the list items, or `None` for anything else.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true for `NIL`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

/// Reads one value from the lexer.
///
/// # Errors
///
/// Returns a parse error on unbalanced parentheses, nesting beyond
/// [`MAX_DEPTH`], or a token that cannot start a value.
pub fn read_value<'a>(lexer: &mut Lexer<'a>) -> Result<Value<'a>> {
    lexer.skip_spaces();
    let token = lexer.next_token()?;
    value_from(lexer, token, 0)
}

fn value_from<'a>(lexer: &mut Lexer<'a>, token: Token<'a>, depth: usize) -> Result<Value<'a>> {
    match token {
        Token::Nil => Ok(Value::Nil),
        Token::Number(n) => Ok(Value::Number(n)),
        Token::QuotedString(s) => Ok(Value::Quoted(s)),
        Token::Literal(bytes) => Ok(Value::Literal(bytes)),
        Token::Atom(atom) => read_atom_with_section(lexer, atom),
        Token::LParen => read_list(lexer, depth + 1),
        other => Err(lexer.error(&format!("Unexpected token {other:?}"))),
    }
}

fn read_list<'a>(lexer: &mut Lexer<'a>, depth: usize) -> Result<Value<'a>> {
    if depth > MAX_DEPTH {
        return Err(lexer.error("List nesting too deep"));
    }

    let mut items = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(Value::List(items)),
            Token::Space => {}
            Token::Crlf | Token::Eof => return Err(lexer.error("Unterminated list")),
            token => items.push(value_from(lexer, token, depth)?),
        }
    }
}

/// Glues `BODY` + `[HEADER]` + `<0>` into a single atom.
fn read_atom_with_section<'a>(lexer: &mut Lexer<'a>, atom: &'a str) -> Result<Value<'a>> {
    if lexer.peek() != Some(b'[') {
        return Ok(Value::Atom(atom.to_string()));
    }

    lexer.next_token()?;
    let section = lexer.read_section()?;
    let mut name = format!("{atom}[{section}]");
    if lexer.peek() == Some(b'<')
        && let Token::Atom(partial) = lexer.next_token()?
    {
        name.push_str(partial);
    }
    Ok(Value::Atom(name))
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

    fn parse(input: &[u8]) -> Result<Value<'_>> {
        read_value(&mut Lexer::new(input))
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse(b"NIL").unwrap(), Value::Nil);
        assert_eq!(parse(b"42").unwrap(), Value::Number(42));
        assert_eq!(parse(b"\"hi\"").unwrap(), Value::Quoted("hi".to_string()));
        assert_eq!(parse(b"{2}\r\nhi").unwrap(), Value::Literal(b"hi"));
    }

    #[test]
    fn test_nested_lists() {
        let value = parse(b"((\"a\" NIL) () 3)").unwrap();
        let items = value.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_list().unwrap()[1], Value::Nil);
        assert!(items[1].as_list().unwrap().is_empty());
        assert_eq!(items[2].as_number(), Some(3));
    }

    #[test]
    fn test_parens_inside_quotes() {
        let value = parse(b"(\"a (b\" \"c)\")").unwrap();
        let items = value.as_list().unwrap();
        assert_eq!(items[0].as_text().as_deref(), Some("a (b"));
        assert_eq!(items[1].as_text().as_deref(), Some("c)"));
    }

    #[test]
    fn test_section_atoms() {
        let value = parse(b"(BODY[HEADER] {3}\r\nabc BODY[]<0> NIL)").unwrap();
        let items = value.as_list().unwrap();
        assert_eq!(items[0], Value::Atom("BODY[HEADER]".to_string()));
        assert_eq!(items[1].as_bytes(), Some(&b"abc"[..]));
        assert_eq!(items[2], Value::Atom("BODY[]<0>".to_string()));
    }

    #[test]
    fn test_unbalanced() {
        assert!(parse(b"(a (b)").is_err());
        assert!(parse(b"(a\r\n").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let ok = format!("{}{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(ok.as_bytes()).is_ok());

        let deep = format!("{}{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(parse(deep.as_bytes()).is_err());
    }
}
