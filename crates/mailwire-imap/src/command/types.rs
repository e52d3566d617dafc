//! Command-related type definitions.

use crate::types::Flag;

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// UID.
    Uid,
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Body section.
    Body {
        /// Section specifier (`HEADER`, `TEXT`, ...). `None` is the whole message.
        section: Option<String>,
        /// Peek (don't set \Seen).
        peek: bool,
    },
}

impl FetchAttribute {
    /// `BODY.PEEK[section]`.
    #[must_use]
    pub fn peek(section: &str) -> Self {
        Self::Body {
            section: Some(section.to_string()),
            peek: true,
        }
    }

    /// Items needed to list a message: UID, flags, size and envelope.
    #[must_use]
    pub fn summary() -> Vec<Self> {
        vec![Self::Uid, Self::Flags, Self::Rfc822Size, Self::Envelope]
    }

    /// Items needed to render a message without marking it read.
    #[must_use]
    pub fn body() -> Vec<Self> {
        vec![Self::Uid, Self::peek("HEADER"), Self::peek("TEXT")]
    }
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace flags.
    SetFlags(Vec<Flag>),
    /// Add flags.
    AddFlags(Vec<Flag>),
    /// Remove flags.
    RemoveFlags(Vec<Flag>),
}

impl StoreAction {
    /// Adds or removes a set of flags.
    #[must_use]
    pub fn toggle(flags: Vec<Flag>, add: bool) -> Self {
        if add {
            Self::AddFlags(flags)
        } else {
            Self::RemoveFlags(flags)
        }
    }
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with \Flagged flag.
    Flagged,
    /// Messages without \Seen flag.
    Unseen,
    /// Messages with \Seen flag.
    Seen,
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// To contains text.
    To(String),
    /// Text in header or body.
    Text(String),
    /// AND of criteria.
    And(Vec<Self>),
    /// OR of criteria.
    Or(Box<Self>, Box<Self>),
    /// NOT of criteria.
    Not(Box<Self>),
}

impl SearchCriteria {
    /// Messages addressed to any of the given recipients, as a right-leaning
    /// `OR` tree of `TO` terms. `None` when the list is empty.
    #[must_use]
    pub fn to_any<I, S>(recipients: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: DoubleEndedIterator,
        S: Into<String>,
    {
        recipients
            .into_iter()
            .rev()
            .map(|r| Self::To(r.into()))
            .reduce(|acc, term| Self::Or(Box::new(term), Box::new(acc)))
    }

    /// Messages whose subject or sender contains `query`.
    #[must_use]
    pub fn subject_or_from(query: &str) -> Self {
        Self::Or(
            Box::new(Self::Subject(query.to_string())),
            Box::new(Self::From(query.to_string())),
        )
    }
}
