//! `MarkerBuffer`: a text buffer with marker layers, exposed to JavaScript
//!
//! Layer and marker ids cross the boundary as numbers; ranges as
//! `[[row, column], [row, column]]` or `{start, end}`; marker options and
//! queries as plain objects.
//!
//! Update notifications are delivered from a microtask once the current
//! task is done, or synchronously through `flushUpdates`. JavaScript
//! listeners always run after the buffer has been released, so they may call
//! back into it.

use super::helpers::{
    call_listener, deserialize, deserialize_or_default, id_to_js, layer_id, marker_error,
    marker_id, serialize,
};
use crate::markers::{FindParams, LayerConfig, LayerId, LayerSnapshot, MarkerLayer, MarkerParams};
use crate::scheduler::UpdateScheduler;
use crate::text::{Point, Range, TextBuffer};
use crate::{wasm_info, wasm_log, wasm_warn};
use js_sys::{Array, Function, Promise};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;

struct Shared {
    buffer: TextBuffer,
    update_listeners: BTreeMap<LayerId, Vec<Function>>,
    destroy_listeners: BTreeMap<LayerId, Vec<Function>>,
}

impl Shared {
    /// Forget listeners of layers the buffer no longer has. Returns the
    /// destroy listeners to call, paired with their layer.
    fn take_destroyed(&mut self) -> Vec<(LayerId, Function)> {
        let gone: Vec<LayerId> = self
            .update_listeners
            .keys()
            .chain(self.destroy_listeners.keys())
            .copied()
            .filter(|id| self.buffer.get_marker_layer(*id).is_none())
            .collect();

        let mut to_call = Vec::new();
        for id in gone {
            self.update_listeners.remove(&id);
            if let Some(callbacks) = self.destroy_listeners.remove(&id) {
                to_call.extend(callbacks.into_iter().map(|callback| (id, callback)));
            }
        }
        to_call
    }
}

/// Flushes on the next microtask
#[derive(Debug)]
struct MicrotaskScheduler {
    shared: Weak<RefCell<Shared>>,
}

impl UpdateScheduler for MicrotaskScheduler {
    fn request_flush(&mut self) {
        queue_flush(self.shared.clone());
    }
}

fn queue_flush(shared: Weak<RefCell<Shared>>) {
    let callback = Closure::once(move |_: JsValue| {
        if let Some(shared) = shared.upgrade() {
            flush(&shared);
        }
    });
    let _ = Promise::resolve(&JsValue::UNDEFINED).then(&callback);
    callback.forget();
}

/// Deliver pending updates, then run JavaScript listeners unborrowed
fn flush(shared: &Rc<RefCell<Shared>>) -> Vec<LayerId> {
    let (delivered, listeners) = {
        let Ok(mut state) = shared.try_borrow_mut() else {
            // The queue stays non-empty and would never request again
            wasm_warn!("buffer busy, update flush deferred");
            queue_flush(Rc::downgrade(shared));
            return Vec::new();
        };
        let delivered = state.buffer.flush_updates();
        let listeners: Vec<(LayerId, Function)> = delivered
            .iter()
            .flat_map(|id| {
                state
                    .update_listeners
                    .get(id)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |callback| (*id, callback))
            })
            .collect();
        (delivered, listeners)
    };

    for (id, callback) in listeners {
        call_listener(&callback, &JsValue::from_f64(id_to_js(id.0)));
    }
    delivered
}

fn range_to_js(range: Range) -> Result<JsValue, JsValue> {
    serialize(&range, "Failed to serialize range")
}

#[wasm_bindgen]
pub struct MarkerBuffer {
    shared: Rc<RefCell<Shared>>,
}

impl MarkerBuffer {
    /// Run `f` on the buffer, then call the destroy listeners of any layer
    /// that disappeared
    fn with_state<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        let (result, destroyed) = {
            let mut state = self.shared.borrow_mut();
            let result = f(&mut state);
            (result, state.take_destroyed())
        };
        for (id, callback) in destroyed {
            call_listener(&callback, &JsValue::from_f64(id_to_js(id.0)));
        }
        result
    }

    fn with_layer<R>(
        &self,
        layer: f64,
        f: impl FnOnce(&mut MarkerLayer, &mut dyn crate::markers::MarkerLayerDelegate) -> crate::Result<R>,
    ) -> Result<R, JsValue> {
        let id = layer_id(layer)?;
        self.with_state(|state| state.buffer.with_layer(id, f))
            .and_then(|result| result)
            .map_err(marker_error)
    }
}

#[wasm_bindgen]
impl MarkerBuffer {
    #[wasm_bindgen(constructor)]
    pub fn new(text: Option<String>) -> MarkerBuffer {
        let text = text.unwrap_or_default();
        let shared = Rc::new_cyclic(|weak: &Weak<RefCell<Shared>>| {
            let scheduler = MicrotaskScheduler {
                shared: weak.clone(),
            };
            RefCell::new(Shared {
                buffer: TextBuffer::with_scheduler(&text, Box::new(scheduler)),
                update_listeners: BTreeMap::new(),
                destroy_listeners: BTreeMap::new(),
            })
        });
        wasm_log!("MarkerBuffer created with {} characters", text.chars().count());
        MarkerBuffer { shared }
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    #[wasm_bindgen(js_name = getText)]
    pub fn get_text(&self) -> String {
        self.shared.borrow().buffer.get_text()
    }

    #[wasm_bindgen(js_name = getLineCount)]
    pub fn get_line_count(&self) -> usize {
        self.shared.borrow().buffer.line_count()
    }

    /// Replace a range with text. Returns the range of the new text.
    #[wasm_bindgen(js_name = setTextInRange)]
    pub fn set_text_in_range(&self, range: JsValue, text: &str) -> Result<JsValue, JsValue> {
        let range: Range = deserialize(range, "Invalid range")?;
        let new_range = self
            .with_state(|state| state.buffer.set_text_in_range(range, text))
            .map_err(marker_error)?;
        range_to_js(new_range)
    }

    pub fn undo(&self) -> Result<bool, JsValue> {
        self.with_state(|state| state.buffer.undo()).map_err(marker_error)
    }

    pub fn redo(&self) -> Result<bool, JsValue> {
        self.with_state(|state| state.buffer.redo()).map_err(marker_error)
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    /// Add a layer. `config` takes `maintainHistory`, `destroyInvalidatedMarkers`,
    /// `role` and `persistent`.
    #[wasm_bindgen(js_name = addMarkerLayer)]
    pub fn add_marker_layer(&self, config: JsValue) -> Result<f64, JsValue> {
        let config: LayerConfig = deserialize_or_default(config, "Invalid layer config")?;
        let id = self.with_state(|state| state.buffer.add_marker_layer(config));
        Ok(id_to_js(id.0))
    }

    #[wasm_bindgen(js_name = getDefaultMarkerLayer)]
    pub fn get_default_marker_layer(&self) -> f64 {
        id_to_js(self.shared.borrow().buffer.default_marker_layer_id().0)
    }

    #[wasm_bindgen(js_name = copyMarkerLayer)]
    pub fn copy_marker_layer(&self, layer: f64) -> Result<f64, JsValue> {
        let id = layer_id(layer)?;
        let copy = self
            .with_state(|state| state.buffer.copy_marker_layer(id))
            .map_err(marker_error)?;
        Ok(id_to_js(copy.0))
    }

    /// Destroy a layer; its `onDidDestroy` listeners run before this returns
    #[wasm_bindgen(js_name = destroyMarkerLayer)]
    pub fn destroy_marker_layer(&self, layer: f64) -> Result<bool, JsValue> {
        let id = layer_id(layer)?;
        Ok(self.with_state(|state| state.buffer.destroy_marker_layer(id)))
    }

    #[wasm_bindgen(js_name = clearMarkerLayer)]
    pub fn clear_marker_layer(&self, layer: f64) -> Result<(), JsValue> {
        self.with_layer(layer, |layer, delegate| {
            layer.clear(delegate);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    /// Mark a range. Option keys other than `reversed`, `tailed`,
    /// `invalidate` and `exclusive` become marker properties.
    #[wasm_bindgen(js_name = markRange)]
    pub fn mark_range(&self, layer: f64, range: JsValue, options: JsValue) -> Result<f64, JsValue> {
        let range: Range = deserialize(range, "Invalid range")?;
        let options: Value = deserialize_or_default(options, "Invalid marker options")?;
        let params = MarkerParams::from_json(&options).map_err(marker_error)?;
        let id = self.with_layer(layer, |layer, delegate| layer.mark_range(delegate, range, params))?;
        Ok(id_to_js(id.0))
    }

    #[wasm_bindgen(js_name = markPosition)]
    pub fn mark_position(&self, layer: f64, position: JsValue, options: JsValue) -> Result<f64, JsValue> {
        let position: Point = deserialize(position, "Invalid position")?;
        let options: Value = deserialize_or_default(options, "Invalid marker options")?;
        let params = MarkerParams::from_json(&options).map_err(marker_error)?;
        let id = self.with_layer(layer, |layer, delegate| {
            layer.mark_position(delegate, position, params)
        })?;
        Ok(id_to_js(id.0))
    }

    #[wasm_bindgen(js_name = destroyMarker)]
    pub fn destroy_marker(&self, layer: f64, marker: f64) -> Result<bool, JsValue> {
        let marker = marker_id(marker)?;
        self.with_layer(layer, |layer, delegate| {
            Ok(layer.destroy_marker(delegate, marker).is_some())
        })
    }

    /// The marker's range, or `undefined` if the layer has no such marker
    #[wasm_bindgen(js_name = getMarkerRange)]
    pub fn get_marker_range(&self, layer: f64, marker: f64) -> Result<JsValue, JsValue> {
        let marker = marker_id(marker)?;
        let range = self.with_layer(layer, |layer, _| Ok(layer.get_marker_range(marker)))?;
        match range {
            Some(range) => range_to_js(range),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = isMarkerValid)]
    pub fn is_marker_valid(&self, layer: f64, marker: f64) -> Result<bool, JsValue> {
        let marker = marker_id(marker)?;
        self.with_layer(layer, |layer, _| {
            Ok(layer.get_marker(marker).map_or(false, |marker| marker.is_valid()))
        })
    }

    #[wasm_bindgen(js_name = getMarkerCount)]
    pub fn get_marker_count(&self, layer: f64) -> Result<usize, JsValue> {
        self.with_layer(layer, |layer, _| Ok(layer.get_marker_count()))
    }

    /// Ids of matching markers, in canonical order
    #[wasm_bindgen(js_name = findMarkers)]
    pub fn find_markers(&self, layer: f64, query: JsValue) -> Result<Array, JsValue> {
        let query: Value = deserialize_or_default(query, "Invalid query")?;
        let params = FindParams::from_json(&query).map_err(marker_error)?;
        let ids = self.with_layer(layer, |layer, _| Ok(layer.find_marker_ids(&params)))?;
        Ok(ids
            .into_iter()
            .map(|id| JsValue::from_f64(id_to_js(id.0)))
            .collect())
    }

    // ------------------------------------------------------------------
    // Snapshots and persistence
    // ------------------------------------------------------------------

    #[wasm_bindgen(js_name = createSnapshot)]
    pub fn create_snapshot(&self, layer: f64) -> Result<JsValue, JsValue> {
        // Through `Value` so numeric marker ids become object keys
        let snapshot = self.with_layer(layer, |layer, _| {
            Ok(serde_json::to_value(layer.create_snapshot())?)
        })?;
        serialize(&snapshot, "Failed to serialize snapshot")
    }

    #[wasm_bindgen(js_name = restoreFromSnapshot)]
    pub fn restore_from_snapshot(
        &self,
        layer: f64,
        snapshot: JsValue,
        force_create: Option<bool>,
    ) -> Result<(), JsValue> {
        let snapshot: Value = deserialize(snapshot, "Invalid snapshot")?;
        let snapshot: LayerSnapshot = MarkerLayer::deserialize_snapshot(&snapshot).map_err(marker_error)?;
        self.with_layer(layer, |layer, delegate| {
            layer.restore_from_snapshot(delegate, &snapshot, force_create.unwrap_or(false))
        })
    }

    #[wasm_bindgen(js_name = serializeMarkerLayer)]
    pub fn serialize_marker_layer(&self, layer: f64) -> Result<JsValue, JsValue> {
        let id = layer_id(layer)?;
        let state = self
            .shared
            .borrow()
            .buffer
            .serialize_marker_layer(id)
            .map_err(marker_error)?;
        serialize(&state, "Failed to serialize marker layer")
    }

    /// Load a persisted layer. Returns its id, or `undefined` when the
    /// state's version is not supported.
    #[wasm_bindgen(js_name = deserializeMarkerLayer)]
    pub fn deserialize_marker_layer(&self, state: JsValue) -> Result<JsValue, JsValue> {
        let state: Value = deserialize(state, "Invalid marker layer state")?;
        let id = self
            .with_state(|shared| shared.buffer.deserialize_marker_layer(&state))
            .map_err(marker_error)?;
        if id.is_none() {
            wasm_info!("marker layer state has an unsupported version, ignored");
        }
        Ok(id.map_or(JsValue::UNDEFINED, |id| JsValue::from_f64(id_to_js(id.0))))
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Call `callback(layerId)` once per task in which the layer changed
    #[wasm_bindgen(js_name = onDidUpdate)]
    pub fn on_did_update(&self, layer: f64, callback: Function) -> Result<(), JsValue> {
        let id = layer_id(layer)?;
        let mut state = self.shared.borrow_mut();
        if state.buffer.get_marker_layer(id).is_none() {
            return Err(marker_error(crate::MarkerError::UnknownLayer(id)));
        }
        state.update_listeners.entry(id).or_default().push(callback);
        Ok(())
    }

    /// Call `callback(layerId)` when the layer is destroyed
    #[wasm_bindgen(js_name = onDidDestroy)]
    pub fn on_did_destroy(&self, layer: f64, callback: Function) -> Result<(), JsValue> {
        let id = layer_id(layer)?;
        let mut state = self.shared.borrow_mut();
        if state.buffer.get_marker_layer(id).is_none() {
            return Err(marker_error(crate::MarkerError::UnknownLayer(id)));
        }
        state.destroy_listeners.entry(id).or_default().push(callback);
        Ok(())
    }

    /// Deliver pending update notifications now. Returns the ids of the
    /// layers that were notified.
    #[wasm_bindgen(js_name = flushUpdates)]
    pub fn flush_updates(&self) -> Array {
        flush(&self.shared)
            .into_iter()
            .map(|id| JsValue::from_f64(id_to_js(id.0)))
            .collect()
    }
}
