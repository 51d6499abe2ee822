//! # `gastown-core`
//!
//! Defines the structs, traits, and store contracts shared by the gastown
//! planner and feeder.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod bead;
pub mod convoy;
pub mod dispatch;
pub mod edge;
pub mod identifier;
pub mod logging;
pub mod routing;
pub mod store;

// Re-exports
pub use bead::{Bead, BeadKind, BeadStatus};
pub use convoy::ConvoyStatus;
pub use edge::{Edge, EdgeClass};
pub use identifier::BeadId;

pub mod prelude {
    //! Provides the types most consumers of gastown-core need.

    pub use crate::bead::{Bead, BeadKind, BeadPatch, BeadStatus, NewBead};
    pub use crate::convoy::ConvoyStatus;
    pub use crate::dispatch::{DispatchError, Dispatcher};
    pub use crate::edge::{Edge, EdgeClass, EdgeDirection};
    pub use crate::identifier::{BeadId, InvalidBeadId};
    pub use crate::routing::RoutingTable;
    pub use crate::store::{ActivityEvent, ActivityKind, BeadStore, StoreError};
}
