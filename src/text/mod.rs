//! Text coordinates and the host buffer
//!
//! ## Modules
//!
//! - `point`: `Point` and `Range` in (row, column) space
//! - `buffer`: line storage, edits, undo/redo and marker-layer hosting

pub mod buffer;
pub mod point;

pub use buffer::{BufferCore, HistorySnapshot, TextBuffer, MAX_UNDO_ENTRIES};
pub use point::{Point, PointInput, Range, RangeInput};
