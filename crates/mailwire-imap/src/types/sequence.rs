//! Sequence sets for message ranges.

/// A set of message sequence numbers or UIDs, kept as inclusive ranges.
///
/// Serializes in IMAP form: `5`, `1:3`, `1:3,7,9:*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet {
    ranges: Vec<(u32, Option<u32>)>,
}

impl SequenceSet {
    /// A single number. Zero is not a valid message number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        (n > 0).then(|| Self {
            ranges: vec![(n, Some(n))],
        })
    }

    /// An inclusive range.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        (start > 0 && end > 0).then(|| Self {
            ranges: vec![(start.min(end), Some(start.max(end)))],
        })
    }

    /// `start:*`, everything from `start` to the end of the mailbox.
    #[must_use]
    pub fn range_from(start: u32) -> Option<Self> {
        (start > 0).then(|| Self {
            ranges: vec![(start, None)],
        })
    }

    /// Builds a compact set from arbitrary numbers, merging consecutive
    /// runs. Zeros and duplicates are dropped; `None` if nothing is left.
    #[must_use]
    pub fn from_numbers(numbers: &[u32]) -> Option<Self> {
        let mut sorted: Vec<u32> = numbers.iter().copied().filter(|&n| n > 0).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<(u32, Option<u32>)> = Vec::new();
        for n in sorted {
            match ranges.last_mut() {
                Some((_, Some(end))) if end.checked_add(1) == Some(n) => *end = n,
                _ => ranges.push((n, Some(n))),
            }
        }

        (!ranges.is_empty()).then_some(Self { ranges })
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match end {
                Some(end) if end == start => write!(f, "{start}")?,
                Some(end) => write!(f, "{start}:{end}")?,
                None => write!(f, "{start}:*")?,
            }
        }
        Ok(())
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
    fn test_single_and_range() {
        assert_eq!(SequenceSet::single(5).unwrap().to_string(), "5");
        assert_eq!(SequenceSet::range(9, 3).unwrap().to_string(), "3:9");
        assert_eq!(SequenceSet::range_from(10).unwrap().to_string(), "10:*");
        assert!(SequenceSet::single(0).is_none());
        assert!(SequenceSet::range(0, 4).is_none());
    }

    #[test]
    fn test_from_numbers_merges_runs() {
        let set = SequenceSet::from_numbers(&[9, 1, 2, 3, 7, 3, 0, 10]).unwrap();
        assert_eq!(set.to_string(), "1:3,7,9:10");
    }

    #[test]
    fn test_from_numbers_descending_input() {
        let set = SequenceSet::from_numbers(&[100, 99, 42]).unwrap();
        assert_eq!(set.to_string(), "42,99:100");
    }

    #[test]
    fn test_from_numbers_empty() {
        assert!(SequenceSet::from_numbers(&[]).is_none());
        assert!(SequenceSet::from_numbers(&[0]).is_none());
    }

    #[test]
    fn test_max_value() {
        let set = SequenceSet::from_numbers(&[u32::MAX, u32::MAX - 1]).unwrap();
        assert_eq!(set.to_string(), format!("{}:{}", u32::MAX - 1, u32::MAX));
    }
}
