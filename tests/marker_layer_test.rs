// Marker layer lifecycle: creation, destruction, copies and projections

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use text_markers_wasm::markers::DisplayMarkerLayer;
use text_markers_wasm::{
    FindParams, InvalidationStrategy, LayerConfig, LayerId, Marker, MarkerError, MarkerId, MarkerLayer,
    MarkerLayerDelegate, MarkerParams, Point, Range, TextBuffer,
};

fn range(a: (usize, usize), b: (usize, usize)) -> Range {
    Range::new(Point::new(a.0, a.1), Point::new(b.0, b.1))
}

/// Delegate over a buffer of fixed line lengths
#[derive(Default)]
struct FixedDelegate {
    line_lengths: Vec<usize>,
    next_marker: u64,
    next_layer: u64,
    updates: Vec<LayerId>,
    destroyed: Vec<LayerId>,
    selections: Vec<LayerId>,
}

impl FixedDelegate {
    fn new(line_lengths: &[usize]) -> Self {
        Self {
            line_lengths: line_lengths.to_vec(),
            next_layer: 10,
            ..Self::default()
        }
    }
}

impl MarkerLayerDelegate for FixedDelegate {
    fn clip_range(&self, range: Range) -> Range {
        Range::new(self.clip_position(range.start), self.clip_position(range.end))
    }

    fn clip_position(&self, point: Point) -> Point {
        let last = self.line_lengths.len() - 1;
        if point.row > last {
            return Point::new(last, self.line_lengths[last]);
        }
        Point::new(point.row, point.column.min(self.line_lengths[point.row]))
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

    fn marker_created(&mut self, _layer: LayerId, _marker: &Marker) {}

    fn markers_updated(&mut self, layer: LayerId) {
        self.updates.push(layer);
    }

    fn marker_layer_destroyed(&mut self, layer: LayerId) {
        self.destroyed.push(layer);
    }

    fn register_selections_marker_layer(&mut self, layer: LayerId) {
        self.selections.push(layer);
    }
}

#[derive(Default)]
struct Projection {
    cleared: usize,
    destroyed_markers: Vec<MarkerId>,
    destroyed: bool,
}

impl DisplayMarkerLayer for Projection {
    fn did_clear_buffer_marker_layer(&mut self) {
        self.cleared += 1;
    }

    fn destroy_marker(&mut self, id: MarkerId) {
        self.destroyed_markers.push(id);
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}

#[test]
fn test_range_after_creation_is_exact() {
    let mut delegate = FixedDelegate::new(&[10, 10, 10]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());

    for requested in [range((0, 0), (0, 0)), range((0, 3), (2, 7)), range((1, 9), (1, 10))] {
        let id = layer
            .create_marker(&mut delegate, requested, MarkerParams::new())
            .expect("marker should be created");
        assert_eq!(layer.get_marker_range(id), Some(requested));
    }
    assert_eq!(layer.get_marker_count(), 3);
}

#[test]
fn test_inverted_range_fails_before_allocating_an_id() {
    let mut delegate = FixedDelegate::new(&[10]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let inverted = Range {
        start: Point::new(0, 5),
        end: Point::new(0, 2),
    };

    let result = layer.create_marker(&mut delegate, inverted, MarkerParams::new());
    assert!(matches!(result, Err(MarkerError::InvalidPosition { .. })));
    assert_eq!(layer.get_marker_count(), 0);

    let id = layer
        .create_marker(&mut delegate, range((0, 1), (0, 2)), MarkerParams::new())
        .unwrap();
    assert_eq!(id, MarkerId(1), "the failed call must not consume an id");
}

#[test]
fn test_non_finite_coordinates_are_rejected() {
    assert!(matches!(
        Point::from_coords(f64::NAN, 0.0),
        Err(MarkerError::InvalidPosition { .. })
    ));
    assert!(Point::from_coords(1.0, -3.0).is_err());
    assert!(matches!(
        Point::from_coords(2.0, f64::INFINITY),
        Err(MarkerError::InvalidPosition { .. })
    ));
    assert!(matches!(
        Point::from_coords(1e300, 0.0),
        Err(MarkerError::InvalidPosition { .. })
    ));
}

#[test]
fn test_oversized_json_coordinates_never_reach_a_layer() {
    let parsed = serde_json::from_value::<Range>(serde_json::json!([[0, 0], [0, 1e300]]));
    assert!(parsed.is_err(), "out-of-range columns are not clamped");

    let query = FindParams::from_json(&serde_json::json!({"startPosition": [1e300, 0]}));
    assert!(query.is_err());

    let mut buffer = TextBuffer::new("abc");
    let state = serde_json::json!({
        "id": 7,
        "markersById": {"1": {"range": [[0, 0], [0, 1e300]]}},
        "version": 2
    });
    assert!(buffer.deserialize_marker_layer(&state).is_err());
    assert!(buffer.get_marker_layer(LayerId(7)).is_none());
}

#[test]
fn test_mark_range_clips_and_mark_position_has_no_tail() {
    let mut delegate = FixedDelegate::new(&[4, 6]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());

    let clipped = layer
        .mark_range(&mut delegate, range((0, 2), (9, 0)), MarkerParams::new())
        .unwrap();
    assert_eq!(layer.get_marker_range(clipped), Some(range((0, 2), (1, 6))));

    let point = layer
        .mark_position(&mut delegate, Point::new(0, 40), MarkerParams::new())
        .unwrap();
    let marker = layer.get_marker(point).unwrap();
    assert!(!marker.has_tail());
    assert!(marker.is_exclusive(), "markers without a tail default to exclusive");
    assert_eq!(layer.get_marker_range(point), Some(Range::at(Point::new(0, 4))));
}

#[test]
fn test_destroy_marker_detaches_it() {
    let mut delegate = FixedDelegate::new(&[10]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let id = layer
        .create_marker(&mut delegate, range((0, 1), (0, 3)), MarkerParams::new())
        .unwrap();

    let marker = layer.destroy_marker(&mut delegate, id).expect("marker exists");
    assert!(marker.is_destroyed());
    assert!(!layer.has_marker(id));
    assert!(layer.get_marker_range(id).is_none());
    assert!(layer.destroy_marker(&mut delegate, id).is_none());
}

#[test]
fn test_copy_is_structurally_equal_with_new_ids() {
    let mut buffer = TextBuffer::new("first line\nsecond line");
    let source = buffer.add_marker_layer(LayerConfig::new().maintain_history(true));
    buffer
        .with_layer(source, |layer, delegate| {
            layer.mark_range(
                delegate,
                range((0, 0), (0, 5)),
                MarkerParams::new()
                    .invalidate(InvalidationStrategy::Inside)
                    .property("kind", "word"),
            )?;
            layer.mark_range(
                delegate,
                range((0, 6), (1, 3)),
                MarkerParams::new().reversed(true),
            )
        })
        .unwrap()
        .unwrap();

    let copy = buffer.copy_marker_layer(source).expect("copy should succeed");
    assert_ne!(copy, source);

    let original = buffer.get_marker_layer(source).unwrap();
    let copied = buffer.get_marker_layer(copy).unwrap();
    assert!(copied.maintains_history());
    assert_eq!(copied.get_marker_count(), original.get_marker_count());

    for (a, b) in original.get_markers().iter().zip(copied.get_markers()) {
        assert_ne!(a.id(), b.id());
        assert_eq!(b.layer(), copy);
        assert_eq!(original.get_marker_range(a.id()), copied.get_marker_range(b.id()));
        assert_eq!(a.properties(), b.properties());
        assert_eq!(a.invalidation_strategy(), b.invalidation_strategy());
        assert_eq!(a.is_reversed(), b.is_reversed());
    }
}

#[test]
fn test_destroyed_layer_is_inert() {
    let mut delegate = FixedDelegate::new(&[20, 20, 20]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let ids: Vec<MarkerId> = (0..3)
        .map(|row| {
            layer
                .create_marker(&mut delegate, range((row, 0), (row, 4)), MarkerParams::new())
                .unwrap()
        })
        .collect();

    let destroy_count = Rc::new(Cell::new(0));
    let counter = destroy_count.clone();
    layer.on_did_destroy(move |_, _| counter.set(counter.get() + 1));

    layer.destroy(&mut delegate);
    layer.destroy(&mut delegate);

    assert_eq!(destroy_count.get(), 1);
    assert_eq!(delegate.destroyed, vec![LayerId(1)]);
    assert!(layer.is_destroyed());
    assert!(ids.iter().all(|id| !layer.has_marker(*id)));
    assert!(!layer.emit_update_event(&mut delegate), "no update after destruction");
    assert!(matches!(
        layer.create_marker(&mut delegate, range((0, 0), (0, 1)), MarkerParams::new()),
        Err(MarkerError::LayerDestroyed(LayerId(1)))
    ));

    // Edits and mutations are no-ops
    layer.splice(&mut delegate, Point::zero(), Point::zero(), Point::new(0, 2));
    assert_eq!(layer.get_marker_count(), 0);
    assert!(!layer.set_marker_is_exclusive(&mut delegate, ids[0], true).unwrap());
}

#[test]
fn test_exclusivity_setter_carries_into_snapshot_and_copy() {
    let mut buffer = TextBuffer::new("abcdefgh");
    let source = buffer.add_marker_layer(LayerConfig::new());
    let id = buffer
        .with_layer(source, |layer, delegate| {
            let id = layer.mark_range(delegate, range((0, 2), (0, 5)), MarkerParams::new())?;
            assert!(layer.set_marker_is_exclusive(delegate, id, true)?);
            assert!(!layer.set_marker_is_exclusive(delegate, id, true)?);
            Ok::<_, MarkerError>(id)
        })
        .unwrap()
        .unwrap();

    let original = buffer.get_marker_layer(source).unwrap();
    assert!(original.get_marker(id).unwrap().is_exclusive());
    assert_eq!(original.create_snapshot()[&id].exclusive, Some(true));

    let copy = buffer.copy_marker_layer(source).unwrap();
    let copied_id = buffer.get_marker_layer(copy).unwrap().get_markers()[0].id();
    assert!(buffer.get_marker_layer(copy).unwrap().get_marker(copied_id).unwrap().is_exclusive());

    buffer.insert(Point::new(0, 2), "xx").unwrap();
    assert_eq!(
        buffer.get_marker_layer(source).unwrap().get_marker_range(id),
        Some(range((0, 4), (0, 7)))
    );
    assert_eq!(
        buffer.get_marker_layer(copy).unwrap().get_marker_range(copied_id),
        Some(range((0, 4), (0, 7)))
    );
}

#[test]
fn test_selections_role_registers_once() {
    let mut delegate = FixedDelegate::new(&[5]);
    let layer = MarkerLayer::new(&mut delegate, LayerId(3), LayerConfig::new().role("selections"));
    assert_eq!(layer.get_role(), Some("selections"));
    assert_eq!(delegate.selections, vec![LayerId(3)]);

    let _other = MarkerLayer::new(&mut delegate, LayerId(4), LayerConfig::new().role("folds"));
    assert_eq!(delegate.selections.len(), 1);

    let mut buffer = TextBuffer::new("abc");
    let selections = buffer.add_marker_layer(LayerConfig::new().role("selections"));
    assert_eq!(buffer.selections_marker_layer_id(), Some(selections));
    buffer.destroy_marker_layer(selections);
    assert_eq!(buffer.selections_marker_layer_id(), None);
}

#[test]
fn test_projection_layers_are_notified() {
    let mut delegate = FixedDelegate::new(&[10, 10]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let projection = Rc::new(RefCell::new(Projection::default()));
    layer.register_display_layer(&projection);

    let id = layer
        .create_marker(&mut delegate, range((0, 0), (0, 2)), MarkerParams::new())
        .unwrap();
    layer.destroy_marker(&mut delegate, id);
    assert_eq!(projection.borrow().destroyed_markers, vec![id]);

    layer
        .create_marker(&mut delegate, range((1, 0), (1, 2)), MarkerParams::new())
        .unwrap();
    layer.clear(&mut delegate);
    assert_eq!(projection.borrow().cleared, 1);
    assert_eq!(layer.get_marker_count(), 0);

    layer.destroy(&mut delegate);
    assert!(projection.borrow().destroyed);
    assert_eq!(layer.display_layer_count(), 0);
}

#[test]
fn test_dropped_projection_is_forgotten() {
    let mut delegate = FixedDelegate::new(&[10]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let projection = Rc::new(RefCell::new(Projection::default()));
    let registration = layer.register_display_layer(&projection);
    drop(projection);

    // Notifying a dropped projection must not panic, and prunes it
    layer.clear(&mut delegate);
    assert_eq!(layer.display_layer_count(), 0);
    assert!(!layer.unregister_display_layer(registration));
}

#[test]
fn test_head_and_tail_movement() {
    let mut delegate = FixedDelegate::new(&[20]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let id = layer
        .create_marker(&mut delegate, range((0, 5), (0, 10)), MarkerParams::new())
        .unwrap();
    assert_eq!(layer.get_marker_head_position(id), Some(Point::new(0, 10)));
    assert_eq!(layer.get_marker_tail_position(id), Some(Point::new(0, 5)));

    // Moving the head before the tail reverses the marker
    layer
        .set_marker_head_position(&mut delegate, id, Point::new(0, 2))
        .unwrap();
    let marker = layer.get_marker(id).unwrap();
    assert!(marker.is_reversed());
    assert_eq!(layer.get_marker_range(id), Some(range((0, 2), (0, 5))));

    layer.clear_marker_tail(&mut delegate, id).unwrap();
    assert!(!layer.get_marker(id).unwrap().has_tail());
    assert_eq!(layer.get_marker_range(id), Some(Range::at(Point::new(0, 2))));

    layer.plant_marker_tail(&mut delegate, id).unwrap();
    layer
        .set_marker_head_position(&mut delegate, id, Point::new(0, 7))
        .unwrap();
    assert_eq!(layer.get_marker_range(id), Some(range((0, 2), (0, 7))));
    assert!(!layer.get_marker(id).unwrap().is_reversed());

    layer
        .set_marker_tail_position(&mut delegate, id, Point::new(0, 12))
        .unwrap();
    assert_eq!(layer.get_marker_range(id), Some(range((0, 7), (0, 12))));
    assert!(layer.get_marker(id).unwrap().is_reversed());
}

#[test]
fn test_properties_merge_and_copy_marker() {
    let mut delegate = FixedDelegate::new(&[20]);
    let mut layer = MarkerLayer::new(&mut delegate, LayerId(1), LayerConfig::new());
    let id = layer
        .create_marker(
            &mut delegate,
            range((0, 1), (0, 4)),
            MarkerParams::new().property("a", 1),
        )
        .unwrap();

    let mut extra = text_markers_wasm::markers::Properties::new();
    extra.insert("b".to_string(), serde_json::json!(2));
    assert!(layer.set_marker_properties(&mut delegate, id, extra).unwrap());

    let copy = layer
        .copy_marker(&mut delegate, id, MarkerParams::new().property("c", 3))
        .unwrap();
    let copied = layer.get_marker(copy).unwrap();
    assert_eq!(copied.properties().len(), 3);
    assert_eq!(layer.get_marker_range(copy), layer.get_marker_range(id));

    assert!(matches!(
        layer.update_marker(&mut delegate, MarkerId(99), Default::default()),
        Err(MarkerError::UnknownMarker(MarkerId(99)))
    ));
}
