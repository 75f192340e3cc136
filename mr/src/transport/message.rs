use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{KeyValue, WorkUnit};

/// A process's identity within the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Rank {
    pub const COORDINATOR: Rank = Rank(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message tag. Data is tagged with the sending rank; `Terminate` is the one
/// reserved marker that ends a phase and is never used for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    Sender(Rank),
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    WorkUnit(WorkUnit),
    Record(KeyValue),
    /// Zero-length message: completion notices, acknowledgements, termination
    /// requests and the end-of-results sentinel.
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    pub payload: Payload,
}

impl Envelope {
    pub fn is_terminate(&self) -> bool {
        self.tag == Tag::Terminate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    Rank(Rank),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilter {
    Any,
    Data,
    Terminate,
}

/// Selects which message a receive will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub source: Source,
    pub tag: TagFilter,
}

impl Filter {
    pub fn any() -> Self {
        Filter {
            source: Source::Any,
            tag: TagFilter::Any,
        }
    }

    pub fn from_rank(rank: Rank) -> Self {
        Filter {
            source: Source::Rank(rank),
            tag: TagFilter::Any,
        }
    }

    pub fn with_tag(self, tag: TagFilter) -> Self {
        Filter { tag, ..self }
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        let source_ok = match self.source {
            Source::Any => true,
            Source::Rank(rank) => envelope.source == rank,
        };
        let tag_ok = match self.tag {
            TagFilter::Any => true,
            TagFilter::Data => matches!(envelope.tag, Tag::Sender(_)),
            TagFilter::Terminate => envelope.tag == Tag::Terminate,
        };
        source_ok && tag_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(source: u32, tag: Tag) -> Envelope {
        Envelope {
            source: Rank(source),
            tag,
            payload: Payload::Signal,
        }
    }

    #[test]
    fn test_filter_matches() {
        let data = signal(2, Tag::Sender(Rank(2)));
        let term = signal(2, Tag::Terminate);

        assert!(Filter::any().matches(&data));
        assert!(Filter::any().matches(&term));
        assert!(Filter::from_rank(Rank(2)).matches(&data));
        assert!(!Filter::from_rank(Rank(3)).matches(&data));
        assert!(Filter::any().with_tag(TagFilter::Data).matches(&data));
        assert!(!Filter::any().with_tag(TagFilter::Data).matches(&term));
        assert!(Filter::from_rank(Rank(2))
            .with_tag(TagFilter::Terminate)
            .matches(&term));
    }

    #[test]
    fn test_terminate_tag_is_distinct_on_the_wire() {
        let data = serde_json::to_string(&Tag::Sender(Rank(0))).unwrap();
        let term = serde_json::to_string(&Tag::Terminate).unwrap();
        assert_ne!(data, term);
        let back: Tag = serde_json::from_str(&term).unwrap();
        assert_eq!(back, Tag::Terminate);
    }
}
