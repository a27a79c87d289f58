//! `find_markers`: spatial predicates narrowed by property filters
//!
//! Each spatial predicate is answered by the index and the answers are
//! intersected, so predicate order never matters. Property filters are
//! strict equality checks applied afterwards. Results come back in
//! canonical order: start ascending, enclosing ranges first, then creation
//! order.

use super::index::SpatialIndex;
use super::layer::MarkerLayer;
use super::marker::{Marker, Properties};
use super::MarkerId;
use crate::error::{MarkerError, Result};
use crate::text::{Point, Range};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicate {
    StartPosition(Point),
    EndPosition(Point),
    StartsInRange(Range),
    EndsInRange(Range),
    ContainsPoint(Point),
    ContainsRange(Range),
    IntersectsRange(Range),
    ContainedInRange(Range),
    StartRow(usize),
    EndRow(usize),
    IntersectsRow(usize),
    IntersectsRowRange(usize, usize),
}

impl SpatialPredicate {
    fn candidates(&self, index: &dyn SpatialIndex) -> BTreeSet<MarkerId> {
        match *self {
            SpatialPredicate::StartPosition(point) => index.find_starting_at(point),
            SpatialPredicate::EndPosition(point) => index.find_ending_at(point),
            SpatialPredicate::StartsInRange(range) => index.find_starting_in(range.start, range.end),
            SpatialPredicate::EndsInRange(range) => index.find_ending_in(range.start, range.end),
            SpatialPredicate::ContainsPoint(point) => index.find_containing(point, point),
            SpatialPredicate::ContainsRange(range) => index.find_containing(range.start, range.end),
            SpatialPredicate::IntersectsRange(range) => {
                index.find_intersecting(range.start, range.end)
            }
            SpatialPredicate::ContainedInRange(range) => {
                index.find_contained_in(range.start, range.end)
            }
            SpatialPredicate::StartRow(row) => {
                index.find_starting_in(Point::row_start(row), Point::row_end(row))
            }
            SpatialPredicate::EndRow(row) => {
                index.find_ending_in(Point::row_start(row), Point::row_end(row))
            }
            SpatialPredicate::IntersectsRow(row) => {
                index.find_intersecting(Point::row_start(row), Point::row_end(row))
            }
            SpatialPredicate::IntersectsRowRange(start_row, end_row) => {
                let range = Range::rows(start_row.min(end_row), start_row.max(end_row));
                index.find_intersecting(range.start, range.end)
            }
        }
    }
}

/// A `find_markers` query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindParams {
    pub spatial: Vec<SpatialPredicate>,
    /// Exact-match filters on marker properties
    pub properties: Properties,
}

impl FindParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: SpatialPredicate) -> Self {
        self.spatial.push(predicate);
        self
    }

    pub fn start_position(self, point: Point) -> Self {
        self.with(SpatialPredicate::StartPosition(point))
    }

    pub fn end_position(self, point: Point) -> Self {
        self.with(SpatialPredicate::EndPosition(point))
    }

    pub fn contains_point(self, point: Point) -> Self {
        self.with(SpatialPredicate::ContainsPoint(point))
    }

    pub fn contains_range(self, range: Range) -> Self {
        self.with(SpatialPredicate::ContainsRange(range))
    }

    pub fn intersects_range(self, range: Range) -> Self {
        self.with(SpatialPredicate::IntersectsRange(range))
    }

    pub fn contained_in_range(self, range: Range) -> Self {
        self.with(SpatialPredicate::ContainedInRange(range))
    }

    pub fn intersects_row(self, row: usize) -> Self {
        self.with(SpatialPredicate::IntersectsRow(row))
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Parse a JSON predicate bag such as
    /// `{"startPosition": [0, 0], "intersectsRow": 3, "kind": "fold"}`
    ///
    /// Keys that are not spatial predicates become property filters.
    pub fn from_json(query: &Value) -> Result<Self> {
        let object = match query {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            other => {
                return Err(MarkerError::InvalidParams(format!(
                    "query must be an object, got {}",
                    other
                )))
            }
        };

        let mut params = Self::new();
        for (key, value) in object {
            let predicate = match key.as_str() {
                "startPosition" => SpatialPredicate::StartPosition(parse_point(key, value)?),
                "endPosition" => SpatialPredicate::EndPosition(parse_point(key, value)?),
                "startsInRange" => SpatialPredicate::StartsInRange(parse_range(key, value)?),
                "endsInRange" => SpatialPredicate::EndsInRange(parse_range(key, value)?),
                "containsPoint" | "containsPosition" => {
                    SpatialPredicate::ContainsPoint(parse_point(key, value)?)
                }
                "containsRange" => SpatialPredicate::ContainsRange(parse_range(key, value)?),
                "intersectsRange" => SpatialPredicate::IntersectsRange(parse_range(key, value)?),
                "containedInRange" => SpatialPredicate::ContainedInRange(parse_range(key, value)?),
                "startRow" => SpatialPredicate::StartRow(parse_row(key, value)?),
                "endRow" => SpatialPredicate::EndRow(parse_row(key, value)?),
                "intersectsRow" => SpatialPredicate::IntersectsRow(parse_row(key, value)?),
                "intersectsRowRange" => {
                    let (start, end) = parse_row_range(key, value)?;
                    SpatialPredicate::IntersectsRowRange(start, end)
                }
                _ => {
                    params.properties.insert(key.clone(), value.clone());
                    continue;
                }
            };
            params.spatial.push(predicate);
        }
        Ok(params)
    }
}

fn parse_point(key: &str, value: &Value) -> Result<Point> {
    serde_json::from_value(value.clone())
        .map_err(|err| MarkerError::invalid_position(format!("{}: {}", key, err)))
}

fn parse_range(key: &str, value: &Value) -> Result<Range> {
    serde_json::from_value(value.clone())
        .map_err(|err| MarkerError::invalid_position(format!("{}: {}", key, err)))
}

fn parse_row(key: &str, value: &Value) -> Result<usize> {
    let row = value
        .as_f64()
        .ok_or_else(|| MarkerError::invalid_position(format!("{}: expected a row number", key)))?;
    Ok(Point::from_coords(row, 0.0)?.row)
}

fn parse_row_range(key: &str, value: &Value) -> Result<(usize, usize)> {
    match value.as_array().map(Vec::as_slice) {
        Some([start, end]) => Ok((parse_row(key, start)?, parse_row(key, end)?)),
        _ => Err(MarkerError::invalid_position(format!(
            "{}: expected [startRow, endRow]",
            key
        ))),
    }
}

impl MarkerLayer {
    /// Markers matching every predicate and filter, in canonical order
    pub fn find_markers(&self, params: &FindParams) -> Vec<&Marker> {
        self.find_marker_ids(params)
            .into_iter()
            .filter_map(|id| self.markers.get(&id))
            .collect()
    }

    /// Ids of the markers `find_markers` would return
    pub fn find_marker_ids(&self, params: &FindParams) -> Vec<MarkerId> {
        let mut candidates: Option<BTreeSet<MarkerId>> = None;
        for predicate in &params.spatial {
            let found = predicate.candidates(self.index.as_ref());
            candidates = Some(match candidates {
                None => found,
                Some(previous) => previous.intersection(&found).copied().collect(),
            });
        }
        let candidates = candidates.unwrap_or_else(|| self.markers.keys().copied().collect());

        let mut ids: Vec<MarkerId> = candidates
            .into_iter()
            .filter(|id| {
                self.markers
                    .get(id)
                    .map_or(false, |marker| marker.matches_properties(&params.properties))
            })
            .collect();
        ids.sort_by(|a, b| self.compare_markers(*a, *b));
        ids
    }
}
