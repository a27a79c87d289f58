//! Error types for marker layers
//!
//! Every fallible operation in the crate returns [`Result`]. Failures are
//! local to the call that raised them: nothing already applied in the same
//! batch is rolled back.

use crate::markers::{LayerId, MarkerId};
use thiserror::Error;

/// Errors raised by marker layers and the host buffer
#[derive(Debug, Error)]
pub enum MarkerError {
    /// Malformed coordinates (non-finite, negative, fractional) or an
    /// inverted range. Raised before anything reaches the spatial index.
    #[error("Invalid position: {reason}")]
    InvalidPosition { reason: String },

    /// Marker options or query parameters of the wrong shape
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The layer has no marker with this id
    #[error("Unknown marker: {0}")]
    UnknownMarker(MarkerId),

    /// Markers cannot be created on a destroyed layer
    #[error("Marker layer {0} has been destroyed")]
    LayerDestroyed(LayerId),

    /// The buffer has no layer with this id
    #[error("Unknown marker layer: {0}")]
    UnknownLayer(LayerId),

    /// Persisted state could not be read or written
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MarkerError {
    pub(crate) fn invalid_position(reason: impl Into<String>) -> Self {
        MarkerError::InvalidPosition {
            reason: reason.into(),
        }
    }
}

/// Result type for marker operations
pub type Result<T> = std::result::Result<T, MarkerError>;
