//! The marker record and its creation parameters

use super::{LayerId, MarkerId};
use crate::error::{MarkerError, Result};
use crate::text::{Point, Range};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Open key/value metadata attached to a marker
pub type Properties = BTreeMap<String, Value>;

/// Rule deciding whether a buffer edit invalidates a marker
///
/// Variants are listed in order of increasing fragility: every edit that
/// invalidates a marker under one strategy also invalidates it under the
/// strategies after it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationStrategy {
    /// No edit invalidates the marker
    Never,
    /// Invalidated by an edit that completely contains the marked range
    Surround,
    /// Invalidated by an edit that surrounds the marker's start or end
    #[default]
    Overlap,
    /// Invalidated by an edit reaching into the marker's interior. Edits that
    /// end at the start or begin at the end do not count.
    Inside,
    /// Invalidated by any contact, including edits touching an endpoint
    Touch,
}

impl InvalidationStrategy {
    pub const ALL: [InvalidationStrategy; 5] = [
        InvalidationStrategy::Never,
        InvalidationStrategy::Surround,
        InvalidationStrategy::Overlap,
        InvalidationStrategy::Inside,
        InvalidationStrategy::Touch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationStrategy::Never => "never",
            InvalidationStrategy::Surround => "surround",
            InvalidationStrategy::Overlap => "overlap",
            InvalidationStrategy::Inside => "inside",
            InvalidationStrategy::Touch => "touch",
        }
    }
}

impl fmt::Display for InvalidationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationStrategy {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self> {
        InvalidationStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| MarkerError::InvalidParams(format!("unknown invalidation strategy '{}'", s)))
    }
}

/// Parameters for a new marker. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerParams {
    pub reversed: Option<bool>,
    pub tailed: Option<bool>,
    pub invalidate: Option<InvalidationStrategy>,
    /// Whether insertions exactly at an endpoint land outside the marker.
    /// Defaults to true for `inside` markers and markers without a tail.
    pub exclusive: Option<bool>,
    pub valid: Option<bool>,
    pub properties: Properties,
}

/// Option keys with marker-specific meaning; every other key is a property
const RESERVED_KEYS: [&str; 4] = ["reversed", "tailed", "invalidate", "exclusive"];

impl MarkerParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(mut self, strategy: InvalidationStrategy) -> Self {
        self.invalidate = Some(strategy);
        self
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = Some(reversed);
        self
    }

    pub fn tailed(mut self, tailed: bool) -> Self {
        self.tailed = Some(tailed);
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = Some(exclusive);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Split a flat options object into reserved fields and properties
    ///
    /// `{"invalidate": "touch", "type": "fold"}` yields a `touch` marker with
    /// the property `type = "fold"`.
    pub fn from_json(options: &Value) -> Result<Self> {
        let mut params = MarkerParams::new();
        let object = match options {
            Value::Null => return Ok(params),
            Value::Object(object) => object,
            other => {
                return Err(MarkerError::InvalidParams(format!(
                    "marker options must be an object, got {}",
                    other
                )))
            }
        };

        for (key, value) in object {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                params.properties.insert(key.clone(), value.clone());
                continue;
            }
            match key.as_str() {
                "invalidate" => {
                    let name = value.as_str().ok_or_else(|| {
                        MarkerError::InvalidParams(format!("invalidate must be a string, got {}", value))
                    })?;
                    params.invalidate = Some(name.parse()?);
                }
                flag => {
                    let flag_value = value.as_bool().ok_or_else(|| {
                        MarkerError::InvalidParams(format!("{} must be a boolean, got {}", flag, value))
                    })?;
                    match flag {
                        "reversed" => params.reversed = Some(flag_value),
                        "tailed" => params.tailed = Some(flag_value),
                        _ => params.exclusive = Some(flag_value),
                    }
                }
            }
        }

        Ok(params)
    }
}

/// A tracked position or range in a marker layer
///
/// The marker's range lives in the layer's spatial index, never here; ask
/// the owning layer for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub(crate) id: MarkerId,
    pub(crate) layer: LayerId,
    pub(crate) invalidate: InvalidationStrategy,
    pub(crate) exclusive: Option<bool>,
    pub(crate) tailed: bool,
    pub(crate) reversed: bool,
    pub(crate) valid: bool,
    pub(crate) destroyed: bool,
    pub(crate) properties: Properties,
}

impl Marker {
    pub(crate) fn new(id: MarkerId, layer: LayerId, params: MarkerParams) -> Self {
        Self {
            id,
            layer,
            invalidate: params.invalidate.unwrap_or_default(),
            exclusive: params.exclusive,
            tailed: params.tailed.unwrap_or(true),
            reversed: params.reversed.unwrap_or(false),
            valid: params.valid.unwrap_or(true),
            destroyed: false,
            properties: params.properties,
        }
    }

    pub fn id(&self) -> MarkerId {
        self.id
    }

    /// Id of the layer that owns this marker
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn invalidation_strategy(&self) -> InvalidationStrategy {
        self.invalidate
    }

    /// Effective exclusivity, taking the defaults into account
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
            .unwrap_or(self.invalidate == InvalidationStrategy::Inside || !self.tailed)
    }

    /// Exclusivity as explicitly requested, if it was
    pub fn exclusive_override(&self) -> Option<bool> {
        self.exclusive
    }

    pub fn has_tail(&self) -> bool {
        self.tailed
    }

    pub fn is_reversed(&self) -> bool {
        self.tailed && self.reversed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True only on the detached value handed back by `destroy_marker`
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Strict equality of every filter against this marker's properties
    pub fn matches_properties(&self, filters: &Properties) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.properties.get(key) == Some(value))
    }

    /// Head and tail for a given range. Without a tail both sit at the head.
    pub(crate) fn head_and_tail(&self, range: Range) -> (Point, Point) {
        let (head, tail) = if self.is_reversed() {
            (range.start, range.end)
        } else {
            (range.end, range.start)
        };
        if self.tailed {
            (head, tail)
        } else {
            (head, head)
        }
    }
}
