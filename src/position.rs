//! Provenance path of a byte (`pos0` in the source vocabulary).
//!
//! A [`Position`] is a stringified, immutable path: the originating image
//! offset followed by zero or more `TAG` or `TAG[offset]` segments added
//! each time a scanner recurses into a decoded substructure. Two pages
//! with equal positions are the same page for dedup purposes.

use std::fmt;

/// One segment of a [`Position`] path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    /// The originating byte offset within the image. Always first.
    Offset(u64),
    /// A scanner tag, e.g. `GZIP`, optionally with a sub-offset within
    /// the decoded payload.
    Tag { name: String, sub_offset: Option<u64> },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Offset(off) => write!(f, "{off}"),
            Segment::Tag { name, sub_offset: Some(o) } => write!(f, "{name}-{o}"),
            Segment::Tag { name, sub_offset: None } => write!(f, "{name}"),
        }
    }
}

/// Immutable provenance path, e.g. `12345-GZIP-0`.
///
/// Equality and hashing use the full stringified path, matching the
/// seen-set's use of `Position` as a dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    segments: Vec<Segment>,
}

impl Position {
    /// Construct a root position from a raw image offset.
    pub fn from_offset(offset: u64) -> Self {
        Self { segments: vec![Segment::Offset(offset)] }
    }

    /// The raw image offset this position ultimately derives from.
    pub fn root_offset(&self) -> u64 {
        match self.segments.first() {
            Some(Segment::Offset(off)) => *off,
            _ => unreachable!("Position always starts with an Offset segment"),
        }
    }

    /// Extend this position with a new tag segment, producing a strictly
    /// longer, distinct child position. The parent is left untouched.
    pub fn derive(&self, tag: &str, sub_offset: Option<u64>) -> Position {
        let mut segments = self.segments.clone();
        segments.push(Segment::Tag { name: tag.to_string(), sub_offset });
        Position { segments }
    }

    /// Number of tag segments added since the root offset — used to
    /// enforce a recursion depth cap.
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// True iff `self` extends `other` with at least one additional
    /// segment, i.e. `other` is a strict prefix of `self`.
    pub fn is_descendant_of(&self, other: &Position) -> bool {
        self.segments.len() > other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// The full stringified path, used for the seen-set and for display.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.segments.iter();
        if let Some(first) = iter.next() {
            write!(f, "{first}")?;
        }
        for seg in iter {
            write!(f, "-{seg}")?;
        }
        Ok(())
    }
}
