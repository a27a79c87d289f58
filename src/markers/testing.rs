//! Minimal delegate for exercising layers without a buffer

use super::delegate::{LayerConfig, MarkerLayerDelegate};
use super::layer::MarkerLayer;
use super::marker::Marker;
use super::{LayerId, MarkerId};
use crate::text::{Point, Range};

/// Records every hook call; clipping is the identity
#[derive(Debug, Default)]
pub(crate) struct TestDelegate {
    next_marker: u64,
    next_layer: u64,
    pub created: Vec<(LayerId, MarkerId)>,
    pub updates: Vec<LayerId>,
    pub destroyed_layers: Vec<LayerId>,
    pub selections: Vec<LayerId>,
}

impl TestDelegate {
    pub fn new() -> Self {
        Self {
            next_layer: 100,
            ..Self::default()
        }
    }
}

impl MarkerLayerDelegate for TestDelegate {
    fn clip_range(&self, range: Range) -> Range {
        range
    }

    fn clip_position(&self, point: Point) -> Point {
        point
    }

    fn next_marker_id(&mut self) -> MarkerId {
        self.next_marker += 1;
        MarkerId(self.next_marker)
    }

    fn add_marker_layer(&mut self, config: LayerConfig) -> MarkerLayer {
        self.next_layer += 1;
        let id = LayerId(self.next_layer);
        MarkerLayer::new(self, id, config)
    }

    fn marker_created(&mut self, layer: LayerId, marker: &Marker) {
        self.created.push((layer, marker.id()));
    }

    fn markers_updated(&mut self, layer: LayerId) {
        self.updates.push(layer);
    }

    fn marker_layer_destroyed(&mut self, layer: LayerId) {
        self.destroyed_layers.push(layer);
    }

    fn register_selections_marker_layer(&mut self, layer: LayerId) {
        self.selections.push(layer);
    }
}
