//! Typed relations between beads.

use std::fmt::{Display, Formatter};

use crate::identifier::BeadId;

/// The class of a relation between two beads.
///
/// Only the blocking classes establish a temporal constraint for
/// scheduling. `parent-child` records hierarchy and `tracks` binds a convoy
/// to its contents; neither ever orders execution.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EdgeClass {
    Blocks,
    ConditionalBlocks,
    WaitsFor,
    ParentChild,
    Tracks,
}

/// The edge classes that induce scheduling order.
pub const BLOCKING_CLASSES: [EdgeClass; 3] = [
    EdgeClass::Blocks,
    EdgeClass::ConditionalBlocks,
    EdgeClass::WaitsFor,
];

impl EdgeClass {
    /// Whether this class participates in cycle detection and wave layering.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            EdgeClass::Blocks | EdgeClass::ConditionalBlocks | EdgeClass::WaitsFor
        )
    }
}

/// A directed relation `from -> to` of some [`EdgeClass`].
///
/// Edges are plain values held in adjacency maps keyed by bead id; beads
/// never hold references to each other.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: BeadId,
    pub to: BeadId,
    pub class: EdgeClass,
}

impl Edge {
    pub fn new(from: BeadId, to: BeadId, class: EdgeClass) -> Self {
        Self { from, to, class }
    }

    /// The endpoint opposite to `id`, if `id` is an endpoint at all.
    pub fn other_end(&self, id: &BeadId) -> Option<&BeadId> {
        if &self.from == id {
            Some(&self.to)
        } else if &self.to == id {
            Some(&self.from)
        } else {
            None
        }
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -{}-> {}", self.from, self.class, self.to)
    }
}

/// Which edges of a bead to list from the store.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EdgeDirection {
    /// Edges pointing at the bead
    Incoming,
    /// Edges leaving the bead
    Outgoing,
    /// Both directions
    Both,
}

impl EdgeDirection {
    pub fn includes_incoming(&self) -> bool {
        matches!(self, EdgeDirection::Incoming | EdgeDirection::Both)
    }

    pub fn includes_outgoing(&self) -> bool {
        matches!(self, EdgeDirection::Outgoing | EdgeDirection::Both)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(EdgeClass::ConditionalBlocks.to_string(), "conditional-blocks");
        assert_eq!(EdgeClass::ParentChild.to_string(), "parent-child");
        assert_eq!("waits-for".parse::<EdgeClass>().unwrap(), EdgeClass::WaitsFor);
    }

    #[test]
    fn blocking_classes() {
        assert!(EdgeClass::Blocks.is_blocking());
        assert!(EdgeClass::ConditionalBlocks.is_blocking());
        assert!(EdgeClass::WaitsFor.is_blocking());
        assert!(!EdgeClass::ParentChild.is_blocking());
        assert!(!EdgeClass::Tracks.is_blocking());
    }

    #[test]
    fn other_end() {
        let edge = Edge::new(
            "gt-1".parse().unwrap(),
            "gt-2".parse().unwrap(),
            EdgeClass::Blocks,
        );
        assert_eq!(
            edge.other_end(&"gt-1".parse().unwrap()),
            Some(&"gt-2".parse().unwrap())
        );
        assert_eq!(edge.other_end(&"gt-9".parse().unwrap()), None);
    }
}
