//! Text buffer hosting marker layers
//!
//! Plain line storage plus the marker-layer bookkeeping a buffer owes its
//! layers: ids, clipping, the update queue, and undo/redo of layers that
//! maintain history.
//!
//! The buffer is split in two. [`BufferCore`] holds the text and every
//! counter and implements [`MarkerLayerDelegate`]; [`TextBuffer`] adds the
//! layer map and history. A layer call borrows one layer mutably and the
//! core as its delegate at the same time.
//!
//! Columns count `char`s.

use super::point::{Point, Range};
use crate::error::{MarkerError, Result};
use crate::markers::{
    FindParams, LayerConfig, LayerId, LayerSnapshot, Marker, MarkerId, MarkerLayer,
    MarkerLayerDelegate, MarkerParams, SerializedLayer,
};
use crate::scheduler::{ManualScheduler, UpdateQueue, UpdateScheduler};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Maximum number of edits kept for undo
pub const MAX_UNDO_ENTRIES: usize = 100;

/// Snapshots of the layers that maintain history, by layer
pub type HistorySnapshot = BTreeMap<LayerId, LayerSnapshot>;

/// Text storage and buffer-wide state handed to layers as their delegate
#[derive(Debug)]
pub struct BufferCore {
    lines: Vec<String>,
    next_marker_id: u64,
    next_layer_id: u64,
    updates: UpdateQueue,
    scheduler: Box<dyn UpdateScheduler>,
    destroyed_layers: Vec<LayerId>,
    selections_layer: Option<LayerId>,
}

impl BufferCore {
    fn new(text: &str, scheduler: Box<dyn UpdateScheduler>) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
            next_marker_id: 0,
            next_layer_id: 0,
            updates: UpdateQueue::new(),
            scheduler,
            destroyed_layers: Vec::new(),
            selections_layer: None,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line_for_row(&self, row: usize) -> Option<&str> {
        self.lines.get(row).map(String::as_str)
    }

    pub fn line_length(&self, row: usize) -> usize {
        self.lines.get(row).map_or(0, |line| line.chars().count())
    }

    /// Position just past the last character
    pub fn get_end_position(&self) -> Point {
        let last = self.lines.len().saturating_sub(1);
        Point::new(last, self.line_length(last))
    }

    pub fn get_text(&self) -> String {
        self.lines.join("\n")
    }

    /// Text covered by a clipped range
    pub fn get_text_in_range(&self, range: Range) -> String {
        let range = self.clip_range(range);
        let (start, end) = (range.start, range.end);
        let start_line = &self.lines[start.row];
        if start.row == end.row {
            let from = byte_offset(start_line, start.column);
            let to = byte_offset(start_line, end.column);
            return start_line[from..to].to_string();
        }

        let mut text = start_line[byte_offset(start_line, start.column)..].to_string();
        for line in &self.lines[start.row + 1..end.row] {
            text.push('\n');
            text.push_str(line);
        }
        let end_line = &self.lines[end.row];
        text.push('\n');
        text.push_str(&end_line[..byte_offset(end_line, end.column)]);
        text
    }

    /// Replace a clipped range with `text`
    fn replace_text(&mut self, range: Range, text: &str) {
        let (start, end) = (range.start, range.end);
        let prefix = {
            let line = &self.lines[start.row];
            line[..byte_offset(line, start.column)].to_string()
        };
        let suffix = {
            let line = &self.lines[end.row];
            line[byte_offset(line, end.column)..].to_string()
        };

        let mut replacement: Vec<String> = text.split('\n').map(str::to_string).collect();
        if let Some(first) = replacement.first_mut() {
            first.insert_str(0, &prefix);
        }
        if let Some(last) = replacement.last_mut() {
            last.push_str(&suffix);
        }
        self.lines.splice(start.row..=end.row, replacement);
    }

    /// Keep the id allocators ahead of ids that came from persisted state
    fn reserve_ids(&mut self, layer: &MarkerLayer) {
        self.next_layer_id = self.next_layer_id.max(layer.id().0);
        if let Some(max) = layer.get_markers().iter().map(|marker| marker.id().0).max() {
            self.next_marker_id = self.next_marker_id.max(max);
        }
    }
}

impl MarkerLayerDelegate for BufferCore {
    fn clip_range(&self, range: Range) -> Range {
        Range::new(self.clip_position(range.start), self.clip_position(range.end))
    }

    fn clip_position(&self, point: Point) -> Point {
        if point.row >= self.lines.len() {
            return self.get_end_position();
        }
        Point::new(point.row, point.column.min(self.line_length(point.row)))
    }

    fn next_marker_id(&mut self) -> MarkerId {
        self.next_marker_id += 1;
        MarkerId(self.next_marker_id)
    }

    fn add_marker_layer(&mut self, config: LayerConfig) -> MarkerLayer {
        self.next_layer_id += 1;
        let id = LayerId(self.next_layer_id);
        MarkerLayer::new(self, id, config)
    }

    fn marker_created(&mut self, layer: LayerId, marker: &Marker) {
        log::trace!("marker {} created on layer {}", marker.id(), layer);
    }

    fn markers_updated(&mut self, layer: LayerId) {
        if self.updates.push(layer) {
            self.scheduler.request_flush();
        }
    }

    fn marker_layer_destroyed(&mut self, layer: LayerId) {
        self.updates.remove(layer);
        self.destroyed_layers.push(layer);
        if self.selections_layer == Some(layer) {
            self.selections_layer = None;
        }
    }

    fn register_selections_marker_layer(&mut self, layer: LayerId) {
        log::debug!("layer {} holds selections", layer);
        self.selections_layer = Some(layer);
    }
}

/// One undoable edit
#[derive(Debug, Clone)]
struct Transaction {
    old_range: Range,
    old_text: String,
    new_range: Range,
    new_text: String,
    markers_before: HistorySnapshot,
    markers_after: HistorySnapshot,
}

/// A text buffer owning marker layers
#[derive(Debug)]
pub struct TextBuffer {
    core: BufferCore,
    layers: BTreeMap<LayerId, MarkerLayer>,
    default_layer: LayerId,
    undo_stack: VecDeque<Transaction>,
    redo_stack: Vec<Transaction>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new("")
    }
}

impl TextBuffer {
    /// Create a buffer whose updates are flushed by hand
    pub fn new(text: &str) -> Self {
        Self::with_scheduler(text, Box::new(ManualScheduler::new()))
    }

    pub fn with_scheduler(text: &str, scheduler: Box<dyn UpdateScheduler>) -> Self {
        let mut core = BufferCore::new(text, scheduler);
        let default = core.add_marker_layer(LayerConfig::new().maintain_history(true));
        let default_layer = default.id();
        let mut layers = BTreeMap::new();
        layers.insert(default_layer, default);
        Self {
            core,
            layers,
            default_layer,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    pub fn core(&self) -> &BufferCore {
        &self.core
    }

    pub fn get_text(&self) -> String {
        self.core.get_text()
    }

    pub fn get_text_in_range(&self, range: Range) -> String {
        self.core.get_text_in_range(range)
    }

    pub fn line_count(&self) -> usize {
        self.core.line_count()
    }

    pub fn line_for_row(&self, row: usize) -> Option<&str> {
        self.core.line_for_row(row)
    }

    pub fn get_end_position(&self) -> Point {
        self.core.get_end_position()
    }

    pub fn clip_position(&self, point: Point) -> Point {
        self.core.clip_position(point)
    }

    pub fn clip_range(&self, range: Range) -> Range {
        self.core.clip_range(range)
    }

    /// Replace a range with `text`, splicing every layer. Returns the range
    /// of the inserted text.
    pub fn set_text_in_range(&mut self, range: Range, text: &str) -> Result<Range> {
        range.validate()?;
        let old_range = self.core.clip_range(range);
        let old_text = self.core.get_text_in_range(old_range);

        let markers_before = self.create_marker_snapshot();
        let new_range = self.apply_change(old_range, text);
        let markers_after = self.create_marker_snapshot();

        self.undo_stack.push_back(Transaction {
            old_range,
            old_text,
            new_range,
            new_text: text.to_string(),
            markers_before,
            markers_after,
        });
        if self.undo_stack.len() > MAX_UNDO_ENTRIES {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
        Ok(new_range)
    }

    pub fn set_text(&mut self, text: &str) -> Result<Range> {
        let everything = Range::new(Point::zero(), self.get_end_position());
        self.set_text_in_range(everything, text)
    }

    pub fn insert(&mut self, position: Point, text: &str) -> Result<Range> {
        self.set_text_in_range(Range::at(position), text)
    }

    pub fn append(&mut self, text: &str) -> Result<Range> {
        self.insert(self.get_end_position(), text)
    }

    pub fn delete(&mut self, range: Range) -> Result<Range> {
        self.set_text_in_range(range, "")
    }

    /// Apply a text change to the lines and every layer, without history
    fn apply_change(&mut self, old_range: Range, text: &str) -> Range {
        let old_extent = old_range.extent();
        let new_extent = text_extent(text);
        let new_range = Range::new(old_range.start, old_range.start.traverse(new_extent));

        let watched: Vec<(LayerId, LayerSnapshot)> = self
            .layers
            .values()
            .filter(|layer| !layer.markers_with_change_listeners().is_empty())
            .map(|layer| (layer.id(), layer.create_snapshot()))
            .collect();

        self.core.replace_text(old_range, text);
        for layer in self.layers.values_mut() {
            layer.splice(&mut self.core, old_range.start, old_extent, new_extent);
        }
        for (id, snapshot) in watched {
            if let Some(layer) = self.layers.get_mut(&id) {
                layer.emit_change_events(&mut self.core, Some(&snapshot));
            }
        }
        self.reap_destroyed_layers();

        log::trace!("replaced {} with {}", old_range, new_range);
        new_range
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Revert the last edit and restore history-keeping layers to their state
    /// before it
    pub fn undo(&mut self) -> Result<bool> {
        let Some(transaction) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        self.apply_change(transaction.new_range, &transaction.old_text);
        self.restore_from_marker_snapshot(&transaction.markers_before)?;
        self.redo_stack.push(transaction);
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let Some(transaction) = self.redo_stack.pop() else {
            return Ok(false);
        };
        self.apply_change(transaction.old_range, &transaction.new_text);
        self.restore_from_marker_snapshot(&transaction.markers_after)?;
        self.undo_stack.push_back(transaction);
        Ok(true)
    }

    /// Snapshot every layer that maintains history
    pub fn create_marker_snapshot(&self) -> HistorySnapshot {
        self.layers
            .values()
            .filter(|layer| layer.maintains_history())
            .map(|layer| (layer.id(), layer.create_snapshot()))
            .collect()
    }

    /// Restore layers from a snapshot; layers that are gone are skipped
    pub fn restore_from_marker_snapshot(&mut self, snapshot: &HistorySnapshot) -> Result<()> {
        for (id, layer_snapshot) in snapshot {
            if let Some(layer) = self.layers.get_mut(id) {
                layer.restore_from_snapshot(&mut self.core, layer_snapshot, false)?;
            }
        }
        self.reap_destroyed_layers();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Marker layers
    // ------------------------------------------------------------------

    pub fn add_marker_layer(&mut self, config: LayerConfig) -> LayerId {
        let layer = self.core.add_marker_layer(config);
        let id = layer.id();
        self.layers.insert(id, layer);
        id
    }

    pub fn get_marker_layer(&self, id: LayerId) -> Option<&MarkerLayer> {
        self.layers.get(&id)
    }

    pub fn marker_layer_ids(&self) -> Vec<LayerId> {
        self.layers.keys().copied().collect()
    }

    pub fn default_marker_layer_id(&self) -> LayerId {
        self.default_layer
    }

    pub fn get_default_marker_layer(&self) -> Option<&MarkerLayer> {
        self.layers.get(&self.default_layer)
    }

    pub fn selections_marker_layer_id(&self) -> Option<LayerId> {
        self.core.selections_layer
    }

    /// Run `f` on a layer with the buffer as its delegate
    pub fn with_layer<R>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut MarkerLayer, &mut dyn MarkerLayerDelegate) -> R,
    ) -> Result<R> {
        let layer = self.layers.get_mut(&id).ok_or(MarkerError::UnknownLayer(id))?;
        let result = f(layer, &mut self.core);
        self.reap_destroyed_layers();
        Ok(result)
    }

    pub fn copy_marker_layer(&mut self, id: LayerId) -> Result<LayerId> {
        let layer = self.layers.get(&id).ok_or(MarkerError::UnknownLayer(id))?;
        let copy = layer.copy(&mut self.core)?;
        let copy_id = copy.id();
        self.layers.insert(copy_id, copy);
        Ok(copy_id)
    }

    /// Destroy a layer. Returns false if it does not exist.
    pub fn destroy_marker_layer(&mut self, id: LayerId) -> bool {
        self.with_layer(id, |layer, delegate| layer.destroy(delegate))
            .is_ok()
    }

    pub fn serialize_marker_layer(&self, id: LayerId) -> Result<Value> {
        self.layers
            .get(&id)
            .ok_or(MarkerError::UnknownLayer(id))?
            .to_json()
    }

    /// Persisted state of every persistent layer
    pub fn serialize_marker_layers(&self) -> BTreeMap<LayerId, SerializedLayer> {
        self.layers
            .values()
            .filter(|layer| layer.is_persistent())
            .map(|layer| (layer.id(), layer.serialize()))
            .collect()
    }

    /// Load a persisted layer, replacing any layer with the same id
    ///
    /// Returns `None` when the state's version is not supported.
    pub fn deserialize_marker_layer(&mut self, state: &Value) -> Result<Option<LayerId>> {
        let mut layer = MarkerLayer::new(&mut self.core, LayerId(0), LayerConfig::new());
        if !layer.deserialize_json_into(&mut self.core, state)? {
            return Ok(None);
        }
        let id = layer.id();
        if self.layers.contains_key(&id) {
            log::debug!("replacing marker layer {} with persisted state", id);
            self.destroy_marker_layer(id);
            if layer.config().is_selections() {
                self.core.selections_layer = Some(id);
            }
        }
        self.core.reserve_ids(&layer);
        self.layers.insert(id, layer);
        Ok(Some(id))
    }

    fn reap_destroyed_layers(&mut self) {
        for id in std::mem::take(&mut self.core.destroyed_layers) {
            self.layers.remove(&id);
        }
    }

    // ------------------------------------------------------------------
    // Default layer shortcuts
    // ------------------------------------------------------------------

    pub fn mark_range(&mut self, range: Range, params: MarkerParams) -> Result<MarkerId> {
        self.with_layer(self.default_layer, |layer, delegate| {
            layer.mark_range(delegate, range, params)
        })?
    }

    pub fn mark_position(&mut self, position: Point, params: MarkerParams) -> Result<MarkerId> {
        self.with_layer(self.default_layer, |layer, delegate| {
            layer.mark_position(delegate, position, params)
        })?
    }

    pub fn get_marker(&self, id: MarkerId) -> Option<&Marker> {
        self.get_default_marker_layer()?.get_marker(id)
    }

    pub fn get_marker_range(&self, id: MarkerId) -> Option<Range> {
        self.get_default_marker_layer()?.get_marker_range(id)
    }

    pub fn find_markers(&self, params: &FindParams) -> Vec<MarkerId> {
        self.get_default_marker_layer()
            .map(|layer| layer.find_marker_ids(params))
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    pub fn has_pending_updates(&self) -> bool {
        !self.core.updates.is_empty()
    }

    /// End the current quantum: deliver one update notification to every
    /// dirty layer. Returns the layers that were notified.
    pub fn flush_updates(&mut self) -> Vec<LayerId> {
        let mut delivered = Vec::new();
        for id in self.core.updates.take() {
            if let Some(layer) = self.layers.get_mut(&id) {
                if layer.emit_update_event(&mut self.core) {
                    delivered.push(id);
                }
            }
        }
        self.reap_destroyed_layers();
        delivered
    }
}

/// Byte offset of a char column, clamped to the line
fn byte_offset(line: &str, column: usize) -> usize {
    line.char_indices()
        .nth(column)
        .map_or(line.len(), |(offset, _)| offset)
}

/// Rows and trailing columns spanned by `text`
fn text_extent(text: &str) -> Point {
    match text.rfind('\n') {
        Some(last_newline) => Point::new(
            text.matches('\n').count(),
            text[last_newline + 1..].chars().count(),
        ),
        None => Point::new(0, text.chars().count()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(row: usize, column: usize) -> Point {
        Point::new(row, column)
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = TextBuffer::new("hello\nworld");
        assert_eq!(buffer.line_count(), 2);
        assert_eq!(buffer.line_for_row(1), Some("world"));
        assert_eq!(buffer.get_end_position(), pt(1, 5));
    }

    #[test]
    fn test_set_text_in_range_across_lines() {
        let mut buffer = TextBuffer::new("abc\ndef\nghi");
        let new_range = buffer
            .set_text_in_range(Range::new(pt(0, 1), pt(2, 1)), "X\nY")
            .unwrap();

        assert_eq!(buffer.get_text(), "aX\nYhi");
        assert_eq!(new_range, Range::new(pt(0, 1), pt(1, 1)));
        assert_eq!(buffer.get_text_in_range(Range::new(pt(0, 0), pt(1, 2))), "aX\nYh");
    }

    #[test]
    fn test_multibyte_columns() {
        let mut buffer = TextBuffer::new("née");
        buffer.insert(pt(0, 2), "-").unwrap();
        assert_eq!(buffer.get_text(), "né-e");
        assert_eq!(buffer.get_end_position(), pt(0, 4));
    }

    #[test]
    fn test_clipping() {
        let buffer = TextBuffer::new("ab\ncdef");
        assert_eq!(buffer.clip_position(pt(0, 9)), pt(0, 2));
        assert_eq!(buffer.clip_position(pt(7, 0)), pt(1, 4));
        assert_eq!(
            buffer.clip_range(Range::new(pt(0, 1), pt(3, 3))),
            Range::new(pt(0, 1), pt(1, 4))
        );
    }

    #[test]
    fn test_text_undo_redo() {
        let mut buffer = TextBuffer::new("abc");
        buffer.insert(pt(0, 3), "d").unwrap();
        assert_eq!(buffer.get_text(), "abcd");

        assert!(buffer.undo().unwrap());
        assert_eq!(buffer.get_text(), "abc");
        assert!(buffer.redo().unwrap());
        assert_eq!(buffer.get_text(), "abcd");
        assert!(!buffer.redo().unwrap());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let mut buffer = TextBuffer::new("abc");
        let inverted = Range {
            start: pt(0, 2),
            end: pt(0, 1),
        };
        assert!(matches!(
            buffer.set_text_in_range(inverted, "x"),
            Err(MarkerError::InvalidPosition { .. })
        ));
        assert_eq!(buffer.get_text(), "abc");
    }

    #[test]
    fn test_text_extent() {
        assert_eq!(text_extent(""), pt(0, 0));
        assert_eq!(text_extent("abc"), pt(0, 3));
        assert_eq!(text_extent("a\nbc"), pt(1, 2));
        assert_eq!(text_extent("a\n"), pt(1, 0));
    }
}
