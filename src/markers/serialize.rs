//! Persisted layer format
//!
//! ```json
//! {
//!   "id": 3,
//!   "maintainHistory": true,
//!   "role": null,
//!   "persistent": true,
//!   "markersById": {
//!     "12": {"range": [[0, 0], [0, 4]], "invalidate": "overlap", "exclusive": null,
//!            "reversed": false, "tailed": true, "valid": true, "properties": {}}
//!   },
//!   "version": 2
//! }
//! ```
//!
//! A state whose `version` differs from [`SERIALIZATION_VERSION`] is ignored.
//! No migration is attempted.

use super::delegate::{LayerConfig, MarkerLayerDelegate};
use super::layer::MarkerLayer;
use super::marker::MarkerParams;
use super::snapshot::LayerSnapshot;
use super::LayerId;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version written by `serialize` and required by `deserialize`
pub const SERIALIZATION_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedLayer {
    pub id: LayerId,
    #[serde(default)]
    pub maintain_history: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub markers_by_id: LayerSnapshot,
    pub version: u32,
}

impl MarkerLayer {
    pub fn serialize(&self) -> SerializedLayer {
        let mut markers_by_id = self.create_snapshot();
        for entry in markers_by_id.values_mut() {
            entry.marker = None;
        }
        SerializedLayer {
            id: self.id,
            maintain_history: self.config.maintain_history,
            role: self.config.role.clone(),
            persistent: self.config.persistent,
            markers_by_id,
            version: SERIALIZATION_VERSION,
        }
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.serialize())?)
    }

    /// Build a layer from persisted state
    ///
    /// With a mismatched version the result is an empty layer with id 0.
    pub fn deserialize(
        delegate: &mut dyn MarkerLayerDelegate,
        state: &SerializedLayer,
    ) -> Result<MarkerLayer> {
        let mut layer = MarkerLayer::new(delegate, LayerId(0), LayerConfig::new());
        layer.deserialize_into(delegate, state)?;
        Ok(layer)
    }

    /// Like [`MarkerLayer::deserialize`], from raw JSON. The version is
    /// checked before the rest of the document is parsed.
    pub fn from_json(delegate: &mut dyn MarkerLayerDelegate, value: &Value) -> Result<MarkerLayer> {
        let mut layer = MarkerLayer::new(delegate, LayerId(0), LayerConfig::new());
        layer.deserialize_json_into(delegate, value)?;
        Ok(layer)
    }

    /// Load persisted state into this layer. Markers keep their persisted
    /// ids and no notifications are sent.
    ///
    /// Returns false, leaving the layer untouched, on a version mismatch.
    pub fn deserialize_into(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        state: &SerializedLayer,
    ) -> Result<bool> {
        if state.version != SERIALIZATION_VERSION {
            log::debug!(
                "ignoring marker layer state with version {} (supported: {})",
                state.version,
                SERIALIZATION_VERSION
            );
            return Ok(false);
        }
        for entry in state.markers_by_id.values() {
            entry.range.validate()?;
        }

        let was_selections = self.config.is_selections();
        self.id = state.id;
        self.config.maintain_history = state.maintain_history;
        self.config.role = state.role.clone();
        self.config.persistent = state.persistent;
        if self.config.is_selections() && !was_selections {
            delegate.register_selections_marker_layer(self.id);
        }

        for (&id, entry) in &state.markers_by_id {
            self.add_marker(id, entry.range, MarkerParams::from(entry))?;
        }
        log::debug!(
            "deserialized marker layer {} with {} markers",
            self.id,
            state.markers_by_id.len()
        );
        Ok(true)
    }

    pub fn deserialize_json_into(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        value: &Value,
    ) -> Result<bool> {
        let version = value.get("version").and_then(Value::as_u64);
        if version != Some(u64::from(SERIALIZATION_VERSION)) {
            log::debug!("ignoring marker layer state with version {:?}", version);
            return Ok(false);
        }
        let state: SerializedLayer = serde_json::from_value(value.clone())?;
        self.deserialize_into(delegate, &state)
    }
}
