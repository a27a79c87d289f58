//! Spatial index over marker ranges
//!
//! [`SpatialIndex`] is the contract a marker layer relies on: id-keyed
//! ranges, point/range queries, and edit-driven translation that reports
//! which markers each invalidation strategy considers invalidated.
//! [`MarkerIndex`] is the bundled implementation. It keeps entries in an
//! ordered map and answers queries with linear scans.

use super::marker::InvalidationStrategy;
use super::MarkerId;
use crate::text::{Point, Range};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Markers affected by one splice, classified per strategy
///
/// The sets are nested: `surround ⊆ overlap ⊆ inside ⊆ touch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceResult {
    /// Every marker with any contact with the edited region
    pub touch: BTreeSet<MarkerId>,
    pub inside: BTreeSet<MarkerId>,
    pub overlap: BTreeSet<MarkerId>,
    pub surround: BTreeSet<MarkerId>,
}

impl SpliceResult {
    /// The ids a strategy considers invalidated; `never` has no set
    pub fn invalidated_by(&self, strategy: InvalidationStrategy) -> Option<&BTreeSet<MarkerId>> {
        match strategy {
            InvalidationStrategy::Never => None,
            InvalidationStrategy::Surround => Some(&self.surround),
            InvalidationStrategy::Overlap => Some(&self.overlap),
            InvalidationStrategy::Inside => Some(&self.inside),
            InvalidationStrategy::Touch => Some(&self.touch),
        }
    }

    pub fn is_invalidated(&self, id: MarkerId, strategy: InvalidationStrategy) -> bool {
        self.invalidated_by(strategy)
            .map_or(false, |ids| ids.contains(&id))
    }
}

/// Interval index keyed by marker id
///
/// Positions returned by the index are the single source of truth for
/// marker ranges.
pub trait SpatialIndex: fmt::Debug {
    fn insert(&mut self, id: MarkerId, start: Point, end: Point);

    /// Returns whether the id was present
    fn remove(&mut self, id: MarkerId) -> bool;

    fn has(&self, id: MarkerId) -> bool;

    fn get_range(&self, id: MarkerId) -> Option<Range>;

    fn get_start(&self, id: MarkerId) -> Option<Point> {
        self.get_range(id).map(|range| range.start)
    }

    fn get_end(&self, id: MarkerId) -> Option<Point> {
        self.get_range(id).map(|range| range.end)
    }

    fn set_exclusive(&mut self, id: MarkerId, exclusive: bool);

    /// Order by start, then by end descending so enclosing ranges come first
    fn compare(&self, a: MarkerId, b: MarkerId) -> Ordering;

    /// Translate every range across the replacement of `old_extent` at
    /// `start` by `new_extent`, classifying contact in pre-edit coordinates
    fn splice(&mut self, start: Point, old_extent: Point, new_extent: Point) -> SpliceResult;

    fn find_starting_at(&self, point: Point) -> BTreeSet<MarkerId>;
    fn find_ending_at(&self, point: Point) -> BTreeSet<MarkerId>;
    fn find_starting_in(&self, start: Point, end: Point) -> BTreeSet<MarkerId>;
    fn find_ending_in(&self, start: Point, end: Point) -> BTreeSet<MarkerId>;
    /// Markers whose range contains `[start, end]`
    fn find_containing(&self, start: Point, end: Point) -> BTreeSet<MarkerId>;
    /// Markers whose range lies within `[start, end]`
    fn find_contained_in(&self, start: Point, end: Point) -> BTreeSet<MarkerId>;
    /// Markers whose range shares at least one point with `[start, end]`
    fn find_intersecting(&self, start: Point, end: Point) -> BTreeSet<MarkerId>;

    /// Every id with its current range
    fn dump(&self) -> BTreeMap<MarkerId, Range>;

    /// Drop every entry
    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    start: Point,
    end: Point,
    exclusive: bool,
}

impl IndexEntry {
    fn range(&self) -> Range {
        Range {
            start: self.start,
            end: self.end,
        }
    }
}

/// The edited region, in pre-edit coordinates, plus where it ends afterwards
#[derive(Debug, Clone, Copy)]
struct Edit {
    start: Point,
    old_end: Point,
    new_end: Point,
}

impl Edit {
    fn is_insertion(&self) -> bool {
        self.start == self.old_end
    }

    fn translate(&self, point: Point, is_start: bool, exclusive: bool) -> Point {
        if point < self.start {
            return point;
        }
        if self.is_insertion() && point == self.start {
            // Inclusive starts and exclusive ends stay in front of inserted text
            let stays = is_start != exclusive;
            return if stays { point } else { self.new_end };
        }
        if point >= self.old_end {
            return self.new_end.traverse(point.traversal(self.old_end));
        }
        if point == self.start {
            point
        } else {
            self.new_end
        }
    }

    fn classify(&self, id: MarkerId, entry: &IndexEntry, result: &mut SpliceResult) {
        let (s, e) = (self.start, self.old_end);
        let (a, b) = (entry.start, entry.end);

        if !(s <= b && e >= a) {
            return;
        }
        let surround = s < e && s <= a && b <= e;
        let overlap = surround || (s < a && a < e) || (s < b && b < e);
        let inside = overlap || (s < b && e > a);

        result.touch.insert(id);
        if inside {
            result.inside.insert(id);
        }
        if overlap {
            result.overlap.insert(id);
        }
        if surround {
            result.surround.insert(id);
        }
    }
}

/// Bundled [`SpatialIndex`] implementation
#[derive(Debug, Clone, Default)]
pub struct MarkerIndex {
    entries: BTreeMap<MarkerId, IndexEntry>,
}

impl MarkerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, predicate: impl Fn(&IndexEntry) -> bool) -> BTreeSet<MarkerId> {
        self.entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl SpatialIndex for MarkerIndex {
    fn insert(&mut self, id: MarkerId, start: Point, end: Point) {
        let exclusive = self.entries.get(&id).map_or(false, |entry| entry.exclusive);
        self.entries.insert(
            id,
            IndexEntry {
                start,
                end,
                exclusive,
            },
        );
    }

    fn remove(&mut self, id: MarkerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn has(&self, id: MarkerId) -> bool {
        self.entries.contains_key(&id)
    }

    fn get_range(&self, id: MarkerId) -> Option<Range> {
        self.entries.get(&id).map(IndexEntry::range)
    }

    fn set_exclusive(&mut self, id: MarkerId, exclusive: bool) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.exclusive = exclusive;
        }
    }

    fn compare(&self, a: MarkerId, b: MarkerId) -> Ordering {
        match (self.entries.get(&a), self.entries.get(&b)) {
            (Some(a), Some(b)) => a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)),
            _ => Ordering::Equal,
        }
    }

    fn splice(&mut self, start: Point, old_extent: Point, new_extent: Point) -> SpliceResult {
        let mut result = SpliceResult::default();
        if old_extent.is_zero() && new_extent.is_zero() {
            return result;
        }

        let edit = Edit {
            start,
            old_end: start.traverse(old_extent),
            new_end: start.traverse(new_extent),
        };

        for (id, entry) in self.entries.iter_mut() {
            edit.classify(*id, entry, &mut result);

            let new_start = edit.translate(entry.start, true, entry.exclusive);
            let new_end = edit.translate(entry.end, false, entry.exclusive);
            entry.start = new_start;
            entry.end = new_end.max(new_start);
        }

        result
    }

    fn find_starting_at(&self, point: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| entry.start == point)
    }

    fn find_ending_at(&self, point: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| entry.end == point)
    }

    fn find_starting_in(&self, start: Point, end: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| start <= entry.start && entry.start <= end)
    }

    fn find_ending_in(&self, start: Point, end: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| start <= entry.end && entry.end <= end)
    }

    fn find_containing(&self, start: Point, end: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| entry.start <= start && end <= entry.end)
    }

    fn find_contained_in(&self, start: Point, end: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| start <= entry.start && entry.end <= end)
    }

    fn find_intersecting(&self, start: Point, end: Point) -> BTreeSet<MarkerId> {
        self.collect(|entry| entry.start <= end && start <= entry.end)
    }

    fn dump(&self) -> BTreeMap<MarkerId, Range> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.range()))
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
