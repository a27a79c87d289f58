//! WASM build test
//!
//! This module tests that the WASM module can be built and that the
//! JavaScript-facing `MarkerBuffer` works end to end.
#![cfg(target_arch = "wasm32")]

use js_sys::{Function, JSON};
use text_markers_wasm::api::MarkerBuffer;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn js(json: &str) -> JsValue {
    JSON::parse(json).unwrap()
}

fn stringify(value: &JsValue) -> String {
    JSON::stringify(value).unwrap().as_string().unwrap()
}

#[wasm_bindgen_test]
fn test_buffer_creation() {
    let buffer = MarkerBuffer::new(Some("hello\nworld".to_string()));
    assert_eq!(buffer.get_text(), "hello\nworld");
    assert_eq!(buffer.get_line_count(), 2);
}

#[wasm_bindgen_test]
fn test_mark_and_edit() {
    let buffer = MarkerBuffer::new(Some("hello world".to_string()));
    let layer = buffer.get_default_marker_layer();
    let marker = buffer
        .mark_range(layer, js("[[0, 6], [0, 11]]"), js(r#"{"kind": "word"}"#))
        .unwrap();

    buffer.set_text_in_range(js("[[0, 0], [0, 0]]"), "big ").unwrap();
    let range = buffer.get_marker_range(layer, marker).unwrap();
    assert_eq!(stringify(&range), "[[0,10],[0,15]]");
    assert!(buffer.is_marker_valid(layer, marker).unwrap());

    let found = buffer.find_markers(layer, js(r#"{"kind": "word"}"#)).unwrap();
    assert_eq!(found.length(), 1);
    assert_eq!(found.get(0).as_f64(), Some(marker));
}

#[wasm_bindgen_test]
fn test_invalid_input_is_rejected() {
    let buffer = MarkerBuffer::new(None);
    let layer = buffer.get_default_marker_layer();
    assert!(buffer.mark_range(layer, js(r#"[[0, "a"], [0, 1]]"#), JsValue::UNDEFINED).is_err());
    assert!(buffer.mark_range(layer, js("[[0, -1], [0, 1]]"), JsValue::UNDEFINED).is_err());
    assert!(buffer.get_marker_count(1.5).is_err());
    assert!(buffer.get_marker_count(999.0).is_err());
}

#[wasm_bindgen_test]
fn test_undo_restores_markers() {
    let buffer = MarkerBuffer::new(Some("one two three".to_string()));
    let layer = buffer.get_default_marker_layer();
    let marker = buffer
        .mark_range(layer, js("[[0, 4], [0, 7]]"), JsValue::UNDEFINED)
        .unwrap();

    buffer.set_text_in_range(js("[[0, 3], [0, 8]]"), "").unwrap();
    assert!(!buffer.is_marker_valid(layer, marker).unwrap());

    assert!(buffer.undo().unwrap());
    assert!(buffer.is_marker_valid(layer, marker).unwrap());
    let range = buffer.get_marker_range(layer, marker).unwrap();
    assert_eq!(stringify(&range), "[[0,4],[0,7]]");
}

#[wasm_bindgen_test]
fn test_update_listener_and_manual_flush() {
    let buffer = MarkerBuffer::new(Some("abc".to_string()));
    let layer = buffer.add_marker_layer(js(r#"{"maintainHistory": true}"#)).unwrap();
    let callback = Function::new_with_args("id", "globalThis.__lastUpdate = id;");
    buffer.on_did_update(layer, callback).unwrap();

    buffer.mark_position(layer, js("[0, 1]"), JsValue::UNDEFINED).unwrap();
    let flushed = buffer.flush_updates();
    assert_eq!(flushed.length(), 1);
    assert_eq!(flushed.get(0).as_f64(), Some(layer));

    let last = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("__lastUpdate")).unwrap();
    assert_eq!(last.as_f64(), Some(layer));
    assert_eq!(buffer.flush_updates().length(), 0);
}

#[wasm_bindgen_test]
fn test_snapshot_and_persistence() {
    let buffer = MarkerBuffer::new(Some("abcdef".to_string()));
    let layer = buffer.add_marker_layer(js(r#"{"persistent": true}"#)).unwrap();
    buffer.mark_range(layer, js("[[0, 1], [0, 3]]"), JsValue::UNDEFINED).unwrap();

    let snapshot = buffer.create_snapshot(layer).unwrap();
    let copy = buffer.add_marker_layer(JsValue::UNDEFINED).unwrap();
    buffer.restore_from_snapshot(copy, snapshot, None).unwrap();
    assert_eq!(buffer.get_marker_count(copy).unwrap(), 1);

    let state = buffer.serialize_marker_layer(layer).unwrap();
    assert!(stringify(&state).contains(r#""version":2"#));

    let other = MarkerBuffer::new(Some("abcdef".to_string()));
    let loaded = other.deserialize_marker_layer(state).unwrap();
    assert_eq!(loaded.as_f64(), Some(layer));
    assert_eq!(other.get_marker_count(layer).unwrap(), 1);

    let stale = other
        .deserialize_marker_layer(js(r#"{"id": 9, "markersById": {}, "version": 1}"#))
        .unwrap();
    assert!(stale.is_undefined());
}

#[wasm_bindgen_test]
fn test_destroy_layer_notifies() {
    let buffer = MarkerBuffer::new(None);
    let layer = buffer.add_marker_layer(JsValue::UNDEFINED).unwrap();
    let callback = Function::new_with_args("id", "globalThis.__destroyed = id;");
    buffer.on_did_destroy(layer, callback).unwrap();

    assert!(buffer.destroy_marker_layer(layer).unwrap());
    let destroyed = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("__destroyed")).unwrap();
    assert_eq!(destroyed.as_f64(), Some(layer));
    assert!(!buffer.destroy_marker_layer(layer).unwrap());
}
