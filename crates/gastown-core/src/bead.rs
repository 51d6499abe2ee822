//! Beads are the persisted units of work the planner schedules.

use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::identifier::BeadId;

/// Label prefix declaring which pool the author expects a bead to route to.
pub const POOL_LABEL_PREFIX: &str = "pool=";

/// The kind of a bead.
///
/// Only schedulable kinds may enter waves; everything else is structure.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BeadKind {
    Epic,
    Task,
    SubEpic,
    Convoy,
    Other,
}

impl BeadKind {
    /// Whether beads of this kind may be assigned to a wave and dispatched.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, BeadKind::Task)
    }
}

/// The lifecycle status of a bead.
///
/// The two `staged_*` forms are only ever carried by convoy beads.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    StagedReady,
    StagedWarnings,
}

impl BeadStatus {
    /// The planner and feeder only care about closed vs not closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, BeadStatus::Closed)
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bead {
    /// Unique identifier; the prefix selects routing
    pub id: BeadId,
    /// The kind tag
    pub kind: BeadKind,
    /// Current lifecycle status
    pub status: BeadStatus,
    /// One line summary
    pub title: String,
    /// Free-form body. Convoys keep their staging notes here.
    #[serde(default)]
    pub body: String,
    /// Small set of labels
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Worker identity this bead is assigned to, set at dispatch
    #[serde(default)]
    pub assignee: Option<String>,
    /// Store metadata flag surfaced on sub-epics
    #[serde(default)]
    pub needs_integration_branch: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
}

impl Bead {
    /// The pool this bead's author expects it to route to, if declared
    /// through a `pool=<name>` label.
    pub fn expected_pool(&self) -> Option<&str> {
        self.labels
            .iter()
            .find_map(|label| label.strip_prefix(POOL_LABEL_PREFIX))
    }
}

/// The fields needed to create a bead.
///
/// When `id` is left empty the store mints one.
#[derive(Debug, Clone)]
pub struct NewBead {
    pub id: Option<BeadId>,
    pub kind: BeadKind,
    pub status: BeadStatus,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub needs_integration_branch: bool,
}

impl NewBead {
    /// Create a new bead description with the default open status.
    pub fn new(kind: BeadKind, title: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            status: BeadStatus::Open,
            title: title.into(),
            body: String::new(),
            labels: BTreeSet::new(),
            needs_integration_branch: false,
        }
    }

    pub fn with_id(mut self, id: BeadId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_status(mut self, status: BeadStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }
}

/// A partial update applied through [`BeadStore::update`](crate::store::BeadStore::update).
///
/// `None` fields are left untouched. `assignee` is doubly optional so an
/// update can clear an assignment.
#[derive(Debug, Clone, Default)]
pub struct BeadPatch {
    pub status: Option<BeadStatus>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub assignee: Option<Option<String>>,
}

impl BeadPatch {
    pub fn status(status: BeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn assign(worker: impl Into<String>) -> Self {
        Self {
            assignee: Some(Some(worker.into())),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_tasks_are_schedulable() {
        assert!(BeadKind::Task.is_schedulable());
        for kind in [
            BeadKind::Epic,
            BeadKind::SubEpic,
            BeadKind::Convoy,
            BeadKind::Other,
        ] {
            assert!(!kind.is_schedulable(), "{} should not schedule", kind);
        }
    }

    #[test]
    fn status_text_forms() {
        assert_eq!(BeadStatus::StagedReady.to_string(), "staged_ready");
        assert_eq!(BeadStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "staged_warnings".parse::<BeadStatus>().unwrap(),
            BeadStatus::StagedWarnings
        );
    }

    #[test]
    fn expected_pool_from_label() {
        let new = NewBead::new(BeadKind::Task, "refit the rig")
            .with_label("pool=refinery")
            .with_label("urgent");
        let bead = Bead {
            id: "gt-1".parse().unwrap(),
            kind: new.kind,
            status: new.status,
            title: new.title,
            body: new.body,
            labels: new.labels,
            assignee: None,
            needs_integration_branch: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            closed_at: None,
        };
        assert_eq!(bead.expected_pool(), Some("refinery"));
    }
}
