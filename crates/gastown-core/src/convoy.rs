//! The convoy status state machine.

use std::fmt::{Display, Formatter};

use crate::bead::BeadStatus;

/// Status of a convoy record.
///
/// ```text
///             (none)
///               │ stage, no findings
///               ▼
///         StagedReady ────launch────────┐
///            ▲    │                     ▼
///  re-stage  │    │ re-stage          Open ──── Closed
///            │    ▼                     ▲
///         StagedWarnings ──launch+force─┘
/// ```
///
/// `Closed` is terminal. Only `Open` convoys are eligible for feeding.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ConvoyStatus {
    StagedReady,
    StagedWarnings,
    Open,
    Closed,
}

impl ConvoyStatus {
    /// Whether the convoy is staged and has not launched yet.
    pub fn is_staged(&self) -> bool {
        matches!(self, ConvoyStatus::StagedReady | ConvoyStatus::StagedWarnings)
    }

    /// Whether the feeder may dispatch against this convoy.
    pub fn is_feedable(&self) -> bool {
        matches!(self, ConvoyStatus::Open)
    }

    /// Whether `self -> to` is an allowed transition.
    ///
    /// Re-staging moves between the two staged forms (including onto the
    /// same one), launching moves a staged convoy to open, and closing an
    /// open convoy ends it. Everything else is forbidden.
    pub fn may_transition(&self, to: ConvoyStatus) -> bool {
        use ConvoyStatus::*;
        matches!(
            (self, to),
            (StagedReady, StagedReady)
                | (StagedReady, StagedWarnings)
                | (StagedReady, Open)
                | (StagedWarnings, StagedReady)
                | (StagedWarnings, StagedWarnings)
                | (StagedWarnings, Open)
                | (Open, Closed)
        )
    }

    /// Whether launching from this status additionally requires `--force`.
    pub fn launch_needs_force(&self) -> bool {
        matches!(self, ConvoyStatus::StagedWarnings)
    }
}

impl Display for ConvoyStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", BeadStatus::from(*self))
    }
}

impl From<ConvoyStatus> for BeadStatus {
    fn from(status: ConvoyStatus) -> Self {
        match status {
            ConvoyStatus::StagedReady => BeadStatus::StagedReady,
            ConvoyStatus::StagedWarnings => BeadStatus::StagedWarnings,
            ConvoyStatus::Open => BeadStatus::Open,
            ConvoyStatus::Closed => BeadStatus::Closed,
        }
    }
}

impl TryFrom<BeadStatus> for ConvoyStatus {
    type Error = NotAConvoyStatus;

    fn try_from(status: BeadStatus) -> Result<Self, Self::Error> {
        match status {
            BeadStatus::StagedReady => Ok(ConvoyStatus::StagedReady),
            BeadStatus::StagedWarnings => Ok(ConvoyStatus::StagedWarnings),
            BeadStatus::Open => Ok(ConvoyStatus::Open),
            BeadStatus::Closed => Ok(ConvoyStatus::Closed),
            other => Err(NotAConvoyStatus { status: other }),
        }
    }
}

/// A bead status that has no convoy interpretation
#[derive(Debug, thiserror::Error)]
#[error("{status} is not a convoy status")]
pub struct NotAConvoyStatus {
    status: BeadStatus,
}
