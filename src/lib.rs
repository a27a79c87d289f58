//! Marker layers for a mutable text buffer
//!
//! Markers are tracked positions and ranges that survive edits to the text
//! they are attached to. They back selections, folds and diagnostics. This
//! crate provides the marker layers, a host text buffer with undo/redo, and
//! a WASM module exposing both to JavaScript.
//!
//! ## Modules
//!
//! - `text`: points, ranges and the host `TextBuffer`
//! - `markers`: marker layers, invalidation, snapshots, queries, events
//! - `scheduler`: deferred delivery of coalesced update notifications
//! - `api`: the JavaScript-facing `MarkerBuffer`

pub mod api;
pub mod error;
pub mod markers;
pub mod scheduler;
pub mod text;

// Re-export commonly used types
pub use error::{MarkerError, Result};
pub use markers::{
    FindParams, InvalidationStrategy, LayerConfig, LayerId, LayerSnapshot, Marker,
    MarkerChangeEvent, MarkerId, MarkerLayer, MarkerLayerDelegate, MarkerParams,
    MarkerSnapshot, MarkerUpdate, SerializedLayer, SpatialIndex, SpatialPredicate, Subscription,
};
pub use scheduler::{ManualScheduler, UpdateQueue, UpdateScheduler};
pub use text::{Point, Range, TextBuffer};

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(feature = "console_log")]
    if console_log::init_with_level(log::Level::Debug).is_err() {
        wasm_warn!("logger already initialized");
    }

    log::info!("Text markers WASM module initialized");
}
