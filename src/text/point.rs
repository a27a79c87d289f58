//! Positions and ranges in buffer coordinates
//!
//! Rows and columns are zero-based. `usize::MAX` stands for an open-ended
//! column, which is how row-oriented queries say "to the end of the row".
//! It is never produced from caller input.

use crate::error::{MarkerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in text (row, column)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "[usize; 2]", try_from = "PointInput")]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    /// Open-ended column, larger than any real column
    pub const MAX_COLUMN: usize = usize::MAX;

    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Create a position at (0, 0)
    pub fn zero() -> Self {
        Self { row: 0, column: 0 }
    }

    /// Create a position at the start of a row
    pub fn row_start(row: usize) -> Self {
        Self { row, column: 0 }
    }

    /// Create a position past every column of a row
    pub fn row_end(row: usize) -> Self {
        Self {
            row,
            column: Self::MAX_COLUMN,
        }
    }

    /// Build a point from raw numeric coordinates
    ///
    /// Fails with [`MarkerError::InvalidPosition`] for NaN, infinite,
    /// negative or fractional values, and for integers too large to be
    /// represented exactly.
    pub fn from_coords(row: f64, column: f64) -> Result<Self> {
        Ok(Self {
            row: coordinate(row, "row")?,
            column: coordinate(column, "column")?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.row == 0 && self.column == 0
    }

    /// Move by an extent: rows add up, and on the same row columns add up
    pub fn traverse(self, extent: Point) -> Point {
        if extent.row == 0 {
            Point::new(self.row, self.column.saturating_add(extent.column))
        } else {
            Point::new(self.row.saturating_add(extent.row), extent.column)
        }
    }

    /// The extent that leads from `origin` to `self`
    pub fn traversal(self, origin: Point) -> Point {
        if self.row == origin.row {
            Point::new(0, self.column.saturating_sub(origin.column))
        } else {
            Point::new(self.row.saturating_sub(origin.row), self.column)
        }
    }
}

/// Largest integer an `f64` holds exactly (JavaScript's `Number.MAX_SAFE_INTEGER`)
const MAX_EXACT_COORDINATE: f64 = 9_007_199_254_740_991.0;

fn coordinate(value: f64, axis: &str) -> Result<usize> {
    if value.is_nan() {
        return Err(MarkerError::invalid_position(format!("{} is NaN", axis)));
    }
    if value.is_infinite() {
        return Err(MarkerError::invalid_position(format!(
            "{} {} is not finite",
            axis, value
        )));
    }
    if value < 0.0 {
        return Err(MarkerError::invalid_position(format!(
            "{} {} is negative",
            axis, value
        )));
    }
    if value.fract() != 0.0 {
        return Err(MarkerError::invalid_position(format!(
            "{} {} is not a whole number",
            axis, value
        )));
    }
    if value > MAX_EXACT_COORDINATE {
        return Err(MarkerError::invalid_position(format!(
            "{} {} is too large",
            axis, value
        )));
    }
    usize::try_from(value as u64)
        .map_err(|_| MarkerError::invalid_position(format!("{} {} is too large", axis, value)))
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

impl From<Point> for [usize; 2] {
    fn from(point: Point) -> Self {
        [point.row, point.column]
    }
}

impl From<(usize, usize)> for Point {
    fn from((row, column): (usize, usize)) -> Self {
        Point::new(row, column)
    }
}

/// Point accepted from JSON or JavaScript: `[row, column]` or `{row, column}`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum PointInput {
    Pair([f64; 2]),
    Object { row: f64, column: f64 },
}

impl TryFrom<PointInput> for Point {
    type Error = MarkerError;

    fn try_from(input: PointInput) -> Result<Self> {
        match input {
            PointInput::Pair([row, column]) => Point::from_coords(row, column),
            PointInput::Object { row, column } => Point::from_coords(row, column),
        }
    }
}

/// A range of text from start to end (both ends are positions between characters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "[Point; 2]", try_from = "RangeInput")]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    /// Create a range, ordering the endpoints
    pub fn new(a: Point, b: Point) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Create an empty range at a position
    pub fn at(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    /// Create a range covering whole rows, open-ended on the last one
    pub fn rows(start_row: usize, end_row: usize) -> Self {
        Self::new(Point::row_start(start_row), Point::row_end(end_row))
    }

    /// Check if this range is empty (start == end)
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this range is on a single row
    pub fn is_single_line(&self) -> bool {
        self.start.row == self.end.row
    }

    /// Extent from start to end
    pub fn extent(&self) -> Point {
        self.end.traversal(self.start)
    }

    /// Check if a position lies within this range, endpoints included
    pub fn contains_point(&self, point: Point) -> bool {
        self.start <= point && point <= self.end
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Fail with [`MarkerError::InvalidPosition`] if the endpoints are inverted
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(MarkerError::invalid_position(format!(
                "range start {} is after its end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.start, self.end)
    }
}

impl From<Range> for [Point; 2] {
    fn from(range: Range) -> Self {
        [range.start, range.end]
    }
}

impl From<((usize, usize), (usize, usize))> for Range {
    fn from((start, end): ((usize, usize), (usize, usize))) -> Self {
        Range::new(start.into(), end.into())
    }
}

/// Range accepted from JSON or JavaScript: `[start, end]` or `{start, end}`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RangeInput {
    Pair([PointInput; 2]),
    Object { start: PointInput, end: PointInput },
}

impl TryFrom<RangeInput> for Range {
    type Error = MarkerError;

    fn try_from(input: RangeInput) -> Result<Self> {
        let (start, end) = match input {
            RangeInput::Pair([start, end]) => (start, end),
            RangeInput::Object { start, end } => (start, end),
        };
        Ok(Range::new(Point::try_from(start)?, Point::try_from(end)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ordering() {
        let p1 = Point::new(0, 5);
        let p2 = Point::new(0, 10);
        let p3 = Point::new(1, 0);

        assert!(p1 < p2);
        assert!(p2 < p3);
        assert!(p1 < p3);
    }

    #[test]
    fn test_traverse_and_traversal() {
        let start = Point::new(2, 4);

        // Same-row extent shifts the column
        assert_eq!(start.traverse(Point::new(0, 3)), Point::new(2, 7));
        // Multi-row extent replaces the column
        assert_eq!(start.traverse(Point::new(1, 3)), Point::new(3, 3));

        assert_eq!(Point::new(2, 7).traversal(start), Point::new(0, 3));
        assert_eq!(Point::new(3, 3).traversal(start), Point::new(1, 3));
    }

    #[test]
    fn test_from_coords_rejects_malformed_values() {
        assert!(Point::from_coords(f64::NAN, 0.0).is_err());
        assert!(Point::from_coords(0.0, -1.0).is_err());
        assert!(Point::from_coords(1.5, 0.0).is_err());
        assert!(Point::from_coords(3.0, f64::INFINITY).is_err());
        assert!(Point::from_coords(f64::NEG_INFINITY, 0.0).is_err());
        assert!(Point::from_coords(1e300, 0.0).is_err());
        assert_eq!(Point::from_coords(1_000_000.0, 7.0).unwrap(), Point::new(1_000_000, 7));
    }

    #[test]
    fn test_range_orders_endpoints() {
        let range = Range::new(Point::new(0, 5), Point::new(0, 2));
        assert_eq!(range.start, Point::new(0, 2));
        assert_eq!(range.end, Point::new(0, 5));
        assert!(range.validate().is_ok());

        let inverted = Range {
            start: Point::new(1, 0),
            end: Point::new(0, 0),
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_range_json_forms() {
        let pair: Range = serde_json::from_str("[[1, 2], [3, 4]]").unwrap();
        let object: Range =
            serde_json::from_str(r#"{"start": {"row": 1, "column": 2}, "end": [3, 4]}"#).unwrap();
        assert_eq!(pair, object);
        assert_eq!(serde_json::to_string(&pair).unwrap(), "[[1,2],[3,4]]");

        let bad: std::result::Result<Range, _> = serde_json::from_str("[[1, -2], [3, 4]]");
        assert!(bad.is_err());
    }
}
