#![deny(rustdoc::broken_intra_doc_links)]

//! The convoy stage-and-launch planner.
//!
//! Staging takes a working set of beads, validates its dependency
//! structure, layers it into waves, and mints (or refreshes) a convoy
//! record in the store. Launching flips a staged convoy to open and
//! dispatches the first wave; everything after that belongs to the feeder.

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde;

pub mod cli;
pub mod core;
pub mod ops;
pub mod report;
pub mod utils;

pub use crate::core::manager::{close, launch, stage, LaunchOutcome, StageOutcome};
pub use crate::core::working_set::WorkingSetSpec;
pub use crate::utils::{ConvoyResult, StageError};
