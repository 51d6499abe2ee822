//! Core parts of the planner: working set resolution, the dependency
//! graph, analysis, wave layering, and the convoy manager.

pub mod analysis;
pub mod graph;
pub mod manager;
pub mod waves;
pub mod working_set;

pub use analysis::{Analysis, Finding, FindingKind, Severity};
pub use graph::{DepGraph, WorkingShape};
pub use waves::WavePlan;
pub use working_set::WorkingSetSpec;
