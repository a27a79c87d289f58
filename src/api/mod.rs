//! Marker buffer WASM API
//!
//! The JavaScript-facing surface of the crate.
//!
//! # Module Structure
//!
//! - `helpers`: console logging, value conversion and error reporting
//! - `buffer`: the `MarkerBuffer` class

pub mod buffer;
pub mod helpers;

pub use buffer::MarkerBuffer;
