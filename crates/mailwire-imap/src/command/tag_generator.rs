//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

/// Tag generator for IMAP commands.
///
/// Generates sequential tags `A0001`, `A0002`, ... Owned by exactly one
/// connection, so a plain counter suffices. Numbers past 9999 simply grow
/// wider.
#[derive(Debug)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag, or `None` once the counter is exhausted so a
    /// tag is never reused.
    pub fn next_tag(&mut self) -> Option<String> {
        self.counter = self.counter.checked_add(1)?;
        Some(format!("{}{:04}", self.prefix, self.counter))
    }

    /// Returns the number of tags issued so far.
    #[must_use]
    pub const fn issued(&self) -> u32 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
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
    fn test_tag_generation() {
        let mut generator = TagGenerator::default();
        assert_eq!(generator.next_tag().unwrap(), "A0001");
        assert_eq!(generator.next_tag().unwrap(), "A0002");
        assert_eq!(generator.next_tag().unwrap(), "A0003");
        assert_eq!(generator.issued(), 3);
    }

    #[test]
    fn test_custom_prefix() {
        let mut generator = TagGenerator::new('T');
        assert_eq!(generator.next_tag().unwrap(), "T0001");
    }

    #[test]
    fn test_format() {
        let mut generator = TagGenerator::default();
        for _ in 1..100 {
            let _ = generator.next_tag();
        }
        assert_eq!(generator.next_tag().unwrap(), "A0100");
        generator.counter = 9999;
        assert_eq!(generator.next_tag().unwrap(), "A10000");
    }

    #[test]
    fn test_uniqueness() {
        let mut generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            assert!(seen.insert(generator.next_tag().unwrap()), "duplicate tag generated");
        }
    }

    #[test]
    fn test_exhaustion() {
        let mut generator = TagGenerator::default();
        generator.counter = u32::MAX;
        assert_eq!(generator.next_tag(), None);
        assert_eq!(generator.next_tag(), None);
    }
}
