//! What a marker layer needs from the buffer that owns it

use super::layer::MarkerLayer;
use super::marker::Marker;
use super::{LayerId, MarkerId};
use crate::text::{Point, Range};
use serde::{Deserialize, Serialize};

/// Role reserved for the layer holding the editor's selections
pub const SELECTIONS_ROLE: &str = "selections";

/// Layer configuration, as accepted from hosts and JavaScript
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerConfig {
    /// Snapshot this layer around every edit so undo/redo restores it
    pub maintain_history: bool,
    /// Destroy markers as soon as an edit invalidates them
    pub destroy_invalidated_markers: bool,
    pub role: Option<String>,
    /// Keep this layer when the buffer is serialized
    pub persistent: bool,
}

impl LayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maintain_history(mut self, maintain_history: bool) -> Self {
        self.maintain_history = maintain_history;
        self
    }

    pub fn destroy_invalidated_markers(mut self, destroy: bool) -> Self {
        self.destroy_invalidated_markers = destroy;
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn is_selections(&self) -> bool {
        self.role.as_deref() == Some(SELECTIONS_ROLE)
    }
}

/// Services and lifecycle hooks supplied by the owning buffer
///
/// The buffer passes itself (or the part of itself that is not the layer
/// map) into every layer call, so the id allocator and the update queue stay
/// explicit state of the buffer.
pub trait MarkerLayerDelegate {
    /// Clamp a range into the buffer's bounds
    fn clip_range(&self, range: Range) -> Range;

    /// Clamp a position into the buffer's bounds
    fn clip_position(&self, point: Point) -> Point;

    /// Monotonic id allocator shared by every layer of the buffer
    fn next_marker_id(&mut self) -> MarkerId;

    /// Build a new, empty layer (used by `MarkerLayer::copy`)
    fn add_marker_layer(&mut self, config: LayerConfig) -> MarkerLayer;

    fn marker_created(&mut self, layer: LayerId, marker: &Marker);

    /// The layer changed; arrange for `emit_update_event` to run once the
    /// current unit of work is over
    fn markers_updated(&mut self, layer: LayerId);

    fn marker_layer_destroyed(&mut self, layer: LayerId);

    /// Called once for a layer whose role is [`SELECTIONS_ROLE`]
    fn register_selections_marker_layer(&mut self, layer: LayerId);
}
