//! Point-in-time capture of a layer and reconciliation back to it
//!
//! Snapshots back undo/redo, layer copies and the persisted format. A
//! snapshot is plain data, independent of later mutation of the layer.

use super::delegate::MarkerLayerDelegate;
use super::events::{Channel, LayerEvent};
use super::layer::{MarkerLayer, MarkerState, MarkerUpdate};
use super::marker::{InvalidationStrategy, Marker, MarkerParams, Properties};
use super::{LayerId, MarkerId};
use crate::error::Result;
use crate::text::Range;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Names the live marker a snapshot entry was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerHandle {
    pub layer: LayerId,
    pub id: MarkerId,
}

/// Full state of one marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSnapshot {
    pub range: Range,
    #[serde(default, alias = "invalidationStrategy")]
    pub invalidate: InvalidationStrategy,
    #[serde(default)]
    pub exclusive: Option<bool>,
    #[serde(default)]
    pub reversed: bool,
    #[serde(default = "default_tailed")]
    pub tailed: bool,
    #[serde(default = "default_valid")]
    pub valid: bool,
    #[serde(default, alias = "metadata")]
    pub properties: Properties,
    /// Present when the entry may be adopted back under its original id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<MarkerHandle>,
}

fn default_tailed() -> bool {
    true
}

fn default_valid() -> bool {
    true
}

/// Marker id → state for every live marker of a layer
pub type LayerSnapshot = BTreeMap<MarkerId, MarkerSnapshot>;

impl From<&MarkerSnapshot> for MarkerParams {
    fn from(snapshot: &MarkerSnapshot) -> Self {
        MarkerParams {
            reversed: Some(snapshot.reversed),
            tailed: Some(snapshot.tailed),
            invalidate: Some(snapshot.invalidate),
            exclusive: snapshot.exclusive,
            valid: Some(snapshot.valid),
            properties: snapshot.properties.clone(),
        }
    }
}

impl From<&MarkerSnapshot> for MarkerUpdate {
    fn from(snapshot: &MarkerSnapshot) -> Self {
        MarkerUpdate {
            range: Some(snapshot.range),
            reversed: Some(snapshot.reversed),
            tailed: Some(snapshot.tailed),
            valid: Some(snapshot.valid),
            exclusive: snapshot.exclusive,
            properties: Some(snapshot.properties.clone()),
        }
    }
}

impl Marker {
    /// Capture this marker at `range`, optionally with a handle back to it
    pub fn snapshot(&self, range: Range, include_handle: bool) -> MarkerSnapshot {
        MarkerSnapshot {
            range,
            invalidate: self.invalidate,
            exclusive: self.exclusive,
            reversed: self.reversed,
            tailed: self.tailed,
            valid: self.valid,
            properties: self.properties.clone(),
            marker: include_handle.then_some(MarkerHandle {
                layer: self.layer,
                id: self.id,
            }),
        }
    }
}

impl MarkerLayer {
    /// Capture every live marker, with ranges read from the index
    pub fn create_snapshot(&self) -> LayerSnapshot {
        self.index
            .dump()
            .into_iter()
            .filter_map(|(id, range)| {
                let marker = self.markers.get(&id)?;
                Some((id, marker.snapshot(range, true)))
            })
            .collect()
    }

    /// Reconcile the layer with `snapshot`
    ///
    /// Markers in both are updated in place, keeping their listeners.
    /// Markers only in the layer are destroyed. Markers only in the snapshot
    /// are re-registered under their old id when the entry carries a handle,
    /// or created under a fresh id when it does not or `force_create` is set.
    /// The whole pass schedules a single update.
    pub fn restore_from_snapshot(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        snapshot: &LayerSnapshot,
        force_create: bool,
    ) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        for entry in snapshot.values() {
            entry.range.validate()?;
        }

        let existing: Vec<MarkerId> = self.markers.keys().copied().collect();
        let mut changed = false;

        for (&id, entry) in snapshot {
            if self.markers.contains_key(&id) {
                changed |= self.update_marker_internal(
                    delegate,
                    id,
                    MarkerUpdate::from(entry),
                    true,
                    true,
                )?;
                continue;
            }

            changed = true;
            match entry.marker {
                Some(handle) if !force_create => self.adopt_marker(delegate, handle.id, entry)?,
                _ => {
                    self.create_marker_internal(
                        delegate,
                        entry.range,
                        MarkerParams::from(entry),
                        true,
                    )?;
                }
            }
        }

        for id in existing {
            if !snapshot.contains_key(&id)
                && self.destroy_marker_internal(delegate, id, true).is_some()
            {
                changed = true;
            }
        }

        if changed {
            self.schedule_update(delegate);
        }
        log::trace!(
            "restored layer {} from snapshot of {} markers",
            self.id(),
            snapshot.len()
        );
        Ok(())
    }

    /// Register a snapshotted marker under its original id
    fn adopt_marker(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        entry: &MarkerSnapshot,
    ) -> Result<()> {
        self.add_marker(id, entry.range, MarkerParams::from(entry))?;
        if self.emit_create_marker_events {
            self.emit(delegate, Channel::DidCreateMarker, LayerEvent::MarkerCreated(id));
        }
        Ok(())
    }

    /// Tell change listeners how their markers moved since `snapshot`
    ///
    /// The host calls this after an edit or an undo, with the snapshot taken
    /// before it.
    pub fn emit_change_events(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        snapshot: Option<&LayerSnapshot>,
    ) {
        let Some(snapshot) = snapshot else {
            return;
        };
        for id in self.markers_with_change_listeners() {
            let Some(entry) = snapshot.get(&id) else {
                continue;
            };
            if !self.markers.contains_key(&id) {
                continue;
            }
            let old = MarkerState::from_snapshot(id, self.id(), entry);
            self.emit_change_event(delegate, id, old, true, false);
        }
    }

    /// Parse a persisted single-layer snapshot
    pub fn deserialize_snapshot(value: &Value) -> Result<LayerSnapshot> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Parse a persisted snapshot covering several layers
    pub fn deserialize_snapshots(value: &Value) -> Result<BTreeMap<LayerId, LayerSnapshot>> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::testing::TestDelegate;
    use crate::markers::LayerConfig;
    use crate::text::Point;
    use serde_json::json;

    fn range(a: (usize, usize), b: (usize, usize)) -> Range {
        Range::new(Point::new(a.0, a.1), Point::new(b.0, b.1))
    }

    #[test]
    fn test_snapshot_is_independent_of_later_edits() {
        let mut delegate = TestDelegate::new();
        let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
        let id = layer
            .create_marker(&mut delegate, range((0, 2), (0, 4)), MarkerParams::new())
            .unwrap();

        let snapshot = layer.create_snapshot();
        layer.splice(&mut delegate, Point::new(0, 0), Point::zero(), Point::new(0, 3));

        assert_eq!(snapshot[&id].range, range((0, 2), (0, 4)));
        assert_eq!(layer.get_marker_range(id), Some(range((0, 5), (0, 7))));
        assert_eq!(snapshot[&id].marker, Some(MarkerHandle { layer: LayerId(1), id }));
    }

    #[test]
    fn test_restore_updates_creates_and_destroys() {
        let mut delegate = TestDelegate::new();
        let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
        let kept = layer
            .create_marker(&mut delegate, range((0, 0), (0, 1)), MarkerParams::new())
            .unwrap();
        let dropped = layer
            .create_marker(&mut delegate, range((1, 0), (1, 1)), MarkerParams::new())
            .unwrap();
        let snapshot = layer.create_snapshot();

        layer
            .set_marker_range(&mut delegate, kept, range((2, 0), (2, 5)), None, None)
            .unwrap();
        layer.destroy_marker(&mut delegate, dropped);
        let added = layer
            .create_marker(&mut delegate, range((3, 0), (3, 1)), MarkerParams::new())
            .unwrap();
        layer.emit_update_event(&mut delegate);
        delegate.updates.clear();

        layer.restore_from_snapshot(&mut delegate, &snapshot, false).unwrap();

        assert_eq!(layer.get_marker_range(kept), Some(range((0, 0), (0, 1))));
        assert_eq!(layer.get_marker_range(dropped), Some(range((1, 0), (1, 1))));
        assert!(!layer.has_marker(added));
        assert_eq!(delegate.updates, vec![LayerId(1)], "one coalesced update");
    }

    #[test]
    fn test_restore_keeps_change_listeners() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut delegate = TestDelegate::new();
        let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
        let id = layer
            .create_marker(&mut delegate, range((0, 0), (0, 1)), MarkerParams::new())
            .unwrap();
        let snapshot = layer.create_snapshot();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        layer
            .on_marker_did_change(id, move |_, _, event| sink.borrow_mut().push(event.clone()))
            .unwrap();

        layer
            .set_marker_range(&mut delegate, id, range((0, 3), (0, 4)), None, None)
            .unwrap();
        layer.restore_from_snapshot(&mut delegate, &snapshot, false).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].old_range, range((0, 3), (0, 4)));
        assert_eq!(seen[1].new_range, range((0, 0), (0, 1)));
        assert!(seen[1].text_changed);
    }

    #[test]
    fn test_force_create_assigns_fresh_ids() {
        let mut delegate = TestDelegate::new();
        let mut source = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
        let id = source
            .create_marker(&mut delegate, range((0, 0), (0, 1)), MarkerParams::new())
            .unwrap();
        let snapshot = source.create_snapshot();

        let mut target = MarkerLayer::new(&mut delegate, LayerId(2), LayerConfig::new());
        target.restore_from_snapshot(&mut delegate, &snapshot, true).unwrap();

        assert!(!target.has_marker(id));
        assert_eq!(target.get_marker_count(), 1);
        let copy = target.get_markers()[0];
        assert_eq!(copy.layer(), LayerId(2));
        assert_eq!(target.get_marker_range(copy.id()), Some(range((0, 0), (0, 1))));
    }

    #[test]
    fn test_snapshot_json_accepts_legacy_keys() {
        let snapshot = MarkerLayer::deserialize_snapshot(&json!({
            "7": {
                "range": [[1, 0], [1, 4]],
                "invalidationStrategy": "touch",
                "metadata": {"kind": "fold"}
            }
        }))
        .unwrap();

        let entry = &snapshot[&MarkerId(7)];
        assert_eq!(entry.invalidate, InvalidationStrategy::Touch);
        assert_eq!(entry.properties.get("kind"), Some(&json!("fold")));
        assert!(entry.tailed && entry.valid && !entry.reversed);
        assert_eq!(entry.marker, None);
    }
}
