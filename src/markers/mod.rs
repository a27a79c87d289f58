//! Marker layers
//!
//! A marker layer is a collection of markers sharing configuration and one
//! spatial index. The layer owns its markers outright; a marker only knows
//! the id of its layer, and every operation on a marker goes through the
//! layer that owns it.
//!
//! ## Modules
//!
//! - `marker`: the marker record, creation parameters, invalidation strategies
//! - `index`: the spatial index interface and the bundled `MarkerIndex`
//! - `delegate`: what a layer needs from its owning buffer
//! - `display`: dependent projection layers
//! - `events`: synchronous and coalesced notifications
//! - `layer`: lifecycle, edits, marker mutation
//! - `snapshot`: point-in-time capture and reconciliation
//! - `serialize`: the persisted layer format
//! - `query`: `find_markers` predicate composition

pub mod delegate;
pub mod display;
pub mod events;
pub mod index;
pub mod layer;
pub mod marker;
pub mod query;
pub mod serialize;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use delegate::{LayerConfig, MarkerLayerDelegate, SELECTIONS_ROLE};
pub use display::{DisplayLayerId, DisplayMarkerLayer};
pub use events::{MarkerChangeEvent, Subscription};
pub use index::{MarkerIndex, SpatialIndex, SpliceResult};
pub use layer::{MarkerLayer, MarkerUpdate};
pub use marker::{InvalidationStrategy, Marker, MarkerParams, Properties};
pub use query::{FindParams, SpatialPredicate};
pub use serialize::{SerializedLayer, SERIALIZATION_VERSION};
pub use snapshot::{LayerSnapshot, MarkerHandle, MarkerSnapshot};

/// Marker id, unique across the lifetime of the owning buffer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marker layer id, unique within the owning buffer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
