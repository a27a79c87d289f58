//! The marker layer: lifecycle, buffer edits and marker mutation
//!
//! A layer keeps its id→marker map and its spatial index in step: an id is in
//! one exactly when it is in the other. Ranges are only ever read from the
//! index.
//!
//! Every call that needs buffer services takes the delegate as an argument.
//! On a destroyed layer, mutators are no-ops (`create_marker` reports
//! [`MarkerError::LayerDestroyed`]) and `has_marker` is always false.

use super::delegate::{LayerConfig, MarkerLayerDelegate};
use super::display::{DisplayLayerId, DisplayLayers, DisplayMarkerLayer};
use super::events::{Channel, LayerEvent, LayerEvents, MarkerChangeEvent, Subscription};
use super::index::{MarkerIndex, SpatialIndex};
use super::marker::{Marker, MarkerParams, Properties};
use super::snapshot::MarkerSnapshot;
use super::{LayerId, MarkerId};
use crate::error::{MarkerError, Result};
use crate::text::{Point, Range};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Changes applied by `update_marker`; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerUpdate {
    pub range: Option<Range>,
    pub reversed: Option<bool>,
    pub tailed: Option<bool>,
    pub valid: Option<bool>,
    pub exclusive: Option<bool>,
    /// Replaces the whole property map
    pub properties: Option<Properties>,
}

/// What change listeners compare before and after a mutation
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MarkerState {
    range: Range,
    head: Point,
    tail: Point,
    valid: bool,
    tailed: bool,
    properties: Properties,
}

impl MarkerState {
    fn of(marker: &Marker, range: Range) -> Self {
        let (head, tail) = marker.head_and_tail(range);
        Self {
            range,
            head,
            tail,
            valid: marker.valid,
            tailed: marker.tailed,
            properties: marker.properties.clone(),
        }
    }

    pub(crate) fn from_snapshot(id: MarkerId, layer: LayerId, snapshot: &MarkerSnapshot) -> Self {
        let marker = Marker::new(id, layer, MarkerParams::from(snapshot));
        Self::of(&marker, snapshot.range)
    }
}

/// A collection of markers sharing configuration and one spatial index
pub struct MarkerLayer {
    pub(super) id: LayerId,
    pub(super) config: LayerConfig,
    pub(super) index: Box<dyn SpatialIndex>,
    pub(super) markers: BTreeMap<MarkerId, Marker>,
    pub(super) events: LayerEvents,
    display_layers: DisplayLayers,
    pub(super) emit_create_marker_events: bool,
    update_pending: bool,
    destroyed: bool,
}

impl MarkerLayer {
    /// Create a layer backed by the bundled [`MarkerIndex`]
    pub fn new(delegate: &mut dyn MarkerLayerDelegate, id: LayerId, config: LayerConfig) -> Self {
        Self::with_index(delegate, id, config, Box::new(MarkerIndex::new()))
    }

    /// Create a layer backed by the given spatial index
    pub fn with_index(
        delegate: &mut dyn MarkerLayerDelegate,
        id: LayerId,
        config: LayerConfig,
        index: Box<dyn SpatialIndex>,
    ) -> Self {
        if config.is_selections() {
            delegate.register_selections_marker_layer(id);
        }
        Self {
            id,
            config,
            index,
            markers: BTreeMap::new(),
            events: LayerEvents::default(),
            display_layers: DisplayLayers::default(),
            emit_create_marker_events: false,
            update_pending: false,
            destroyed: false,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn get_role(&self) -> Option<&str> {
        self.config.role.as_deref()
    }

    pub fn maintains_history(&self) -> bool {
        self.config.maintain_history
    }

    pub fn is_persistent(&self) -> bool {
        self.config.persistent
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_alive(&self) -> bool {
        !self.destroyed
    }

    /// A new layer with the same configuration and structurally equal
    /// markers under fresh ids
    pub fn copy(&self, delegate: &mut dyn MarkerLayerDelegate) -> Result<MarkerLayer> {
        let mut copy = delegate.add_marker_layer(self.config.clone());
        for (id, marker) in &self.markers {
            let Some(range) = self.index.get_range(*id) else {
                continue;
            };
            let snapshot = marker.snapshot(range, false);
            copy.create_marker(delegate, range, MarkerParams::from(&snapshot))?;
        }
        Ok(copy)
    }

    /// Destroy the layer and every marker on it. Calling it again does nothing.
    pub fn destroy(&mut self, delegate: &mut dyn MarkerLayerDelegate) {
        if self.destroyed {
            return;
        }
        self.clear(delegate);
        delegate.marker_layer_destroyed(self.id);
        self.display_layers.destroy_all();
        self.destroyed = true;
        self.update_pending = false;
        self.emit(delegate, Channel::DidDestroy, LayerEvent::Destroyed);
        self.events.dispose();
        log::debug!("marker layer {} destroyed", self.id);
    }

    /// Remove every marker. Markers with destroy listeners are destroyed one
    /// by one so their listeners run; the rest are dropped wholesale.
    pub fn clear(&mut self, delegate: &mut dyn MarkerLayerDelegate) {
        if self.destroyed {
            return;
        }
        for id in self.events.markers_with_destroy_listeners() {
            self.destroy_marker_internal(delegate, id, true);
        }
        for id in self.events.markers_with_change_listeners() {
            self.events.take_channel(Channel::MarkerDidChange(id));
        }
        self.markers.clear();
        self.index.clear();
        self.display_layers.did_clear();
        self.schedule_update(delegate);
    }

    // ------------------------------------------------------------------
    // Querying
    // ------------------------------------------------------------------

    pub fn get_marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    /// Every marker, in id (creation) order
    pub fn get_markers(&self) -> Vec<&Marker> {
        self.markers.values().collect()
    }

    pub fn get_marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn has_marker(&self, id: MarkerId) -> bool {
        !self.destroyed && self.index.has(id)
    }

    pub fn get_marker_range(&self, id: MarkerId) -> Option<Range> {
        self.index.get_range(id)
    }

    pub fn get_marker_start_position(&self, id: MarkerId) -> Option<Point> {
        self.index.get_start(id)
    }

    pub fn get_marker_end_position(&self, id: MarkerId) -> Option<Point> {
        self.index.get_end(id)
    }

    pub fn get_marker_head_position(&self, id: MarkerId) -> Option<Point> {
        let range = self.index.get_range(id)?;
        Some(self.markers.get(&id)?.head_and_tail(range).0)
    }

    pub fn get_marker_tail_position(&self, id: MarkerId) -> Option<Point> {
        let range = self.index.get_range(id)?;
        Some(self.markers.get(&id)?.head_and_tail(range).1)
    }

    /// Canonical marker order: by range, then by creation sequence
    pub fn compare_markers(&self, a: MarkerId, b: MarkerId) -> Ordering {
        self.index.compare(a, b).then_with(|| a.cmp(&b))
    }

    // ------------------------------------------------------------------
    // Marker creation
    // ------------------------------------------------------------------

    /// Clip a range into the buffer and mark it
    pub fn mark_range(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        range: Range,
        params: MarkerParams,
    ) -> Result<MarkerId> {
        range.validate()?;
        let range = delegate.clip_range(range);
        self.create_marker(delegate, range, params)
    }

    /// Mark a single clipped position with a marker that has no tail
    pub fn mark_position(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        position: Point,
        params: MarkerParams,
    ) -> Result<MarkerId> {
        let position = delegate.clip_position(position);
        let params = params.tailed(false);
        self.create_marker(delegate, Range::at(position), params)
    }

    /// Create a marker over exactly `range` (no clipping)
    pub fn create_marker(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        range: Range,
        params: MarkerParams,
    ) -> Result<MarkerId> {
        self.create_marker_internal(delegate, range, params, false)
    }

    pub(super) fn create_marker_internal(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        range: Range,
        params: MarkerParams,
        suppress_update: bool,
    ) -> Result<MarkerId> {
        if self.destroyed {
            return Err(MarkerError::LayerDestroyed(self.id));
        }
        range.validate()?;

        let id = delegate.next_marker_id();
        self.add_marker(id, range, params)?;
        if let Some(marker) = self.markers.get(&id) {
            delegate.marker_created(self.id, marker);
        }
        if !suppress_update {
            self.schedule_update(delegate);
        }
        if self.emit_create_marker_events {
            self.emit(delegate, Channel::DidCreateMarker, LayerEvent::MarkerCreated(id));
        }
        Ok(id)
    }

    /// Register a marker under a known id without any notification
    pub(super) fn add_marker(&mut self, id: MarkerId, range: Range, params: MarkerParams) -> Result<()> {
        range.validate()?;
        self.index.insert(id, range.start, range.end);
        let marker = Marker::new(id, self.id, params);
        self.index.set_exclusive(id, marker.is_exclusive());
        self.markers.insert(id, marker);
        Ok(())
    }

    /// Create a marker like an existing one, with `params` applied on top
    pub fn copy_marker(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        params: MarkerParams,
    ) -> Result<MarkerId> {
        let range = self.index.get_range(id).ok_or(MarkerError::UnknownMarker(id))?;
        let marker = self.markers.get(&id).ok_or(MarkerError::UnknownMarker(id))?;
        let mut merged = MarkerParams::from(&marker.snapshot(range, false));
        merged.reversed = params.reversed.or(merged.reversed);
        merged.tailed = params.tailed.or(merged.tailed);
        merged.invalidate = params.invalidate.or(merged.invalidate);
        merged.exclusive = params.exclusive.or(merged.exclusive);
        merged.properties.extend(params.properties);
        self.create_marker(delegate, range, merged)
    }

    // ------------------------------------------------------------------
    // Marker destruction
    // ------------------------------------------------------------------

    /// Destroy a marker. Returns the detached marker, flagged destroyed.
    pub fn destroy_marker(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
    ) -> Option<Marker> {
        self.destroy_marker_internal(delegate, id, false)
    }

    pub(super) fn destroy_marker_internal(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        suppress_update: bool,
    ) -> Option<Marker> {
        let mut marker = self.markers.remove(&id)?;
        self.index.remove(id);
        marker.destroyed = true;

        self.events.take_channel(Channel::MarkerDidChange(id));
        let destroy_listeners = self.events.take_channel(Channel::MarkerDidDestroy(id));
        self.display_layers.destroy_marker(id);
        if !suppress_update {
            self.schedule_update(delegate);
        }

        if let Some(listeners) = destroy_listeners {
            let event = LayerEvent::MarkerDestroyed(id);
            for (_, mut handler) in listeners.into_handlers() {
                handler(self, delegate, &event);
            }
        }
        Some(marker)
    }

    // ------------------------------------------------------------------
    // Buffer edits
    // ------------------------------------------------------------------

    /// Apply a buffer edit: `old_extent` at `start` was replaced by `new_extent`
    ///
    /// Markers the edit invalidates under their own strategy are destroyed
    /// when the layer destroys invalidated markers, and flagged invalid
    /// otherwise.
    pub fn splice(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        start: Point,
        old_extent: Point,
        new_extent: Point,
    ) {
        if self.destroyed {
            return;
        }
        let invalidated = self.index.splice(start, old_extent, new_extent);

        let doomed: Vec<MarkerId> = invalidated
            .touch
            .iter()
            .copied()
            .filter(|id| {
                self.markers
                    .get(id)
                    .map_or(false, |marker| invalidated.is_invalidated(*id, marker.invalidate))
            })
            .collect();

        for id in doomed {
            if self.config.destroy_invalidated_markers {
                self.destroy_marker_internal(delegate, id, true);
            } else if let Some(marker) = self.markers.get_mut(&id) {
                marker.valid = false;
            }
        }

        let moved = !(old_extent.is_zero() && new_extent.is_zero());
        if moved && (!self.markers.is_empty() || !invalidated.touch.is_empty()) {
            self.schedule_update(delegate);
        }
    }

    // ------------------------------------------------------------------
    // Marker mutation
    // ------------------------------------------------------------------

    /// Apply an update to a marker, notifying its change listeners
    ///
    /// Returns whether anything changed.
    pub fn update_marker(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        update: MarkerUpdate,
    ) -> Result<bool> {
        self.update_marker_internal(delegate, id, update, false, false)
    }

    pub(super) fn update_marker_internal(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        update: MarkerUpdate,
        text_changed: bool,
        suppress_update: bool,
    ) -> Result<bool> {
        if self.destroyed {
            return Ok(false);
        }
        let old_range = self.index.get_range(id).ok_or(MarkerError::UnknownMarker(id))?;
        let marker = self.markers.get_mut(&id).ok_or(MarkerError::UnknownMarker(id))?;
        if let Some(range) = update.range {
            range.validate()?;
        }

        let old_state = MarkerState::of(marker, old_range);
        let was_exclusive = marker.is_exclusive();
        let mut updated = false;
        let mut properties_changed = false;

        if let Some(reversed) = update.reversed {
            if reversed != marker.reversed {
                marker.reversed = reversed;
                updated = true;
            }
        }
        if let Some(tailed) = update.tailed {
            if tailed != marker.tailed {
                marker.tailed = tailed;
                updated = true;
            }
        }
        if let Some(valid) = update.valid {
            if valid != marker.valid {
                marker.valid = valid;
                updated = true;
            }
        }
        if let Some(exclusive) = update.exclusive {
            if marker.exclusive != Some(exclusive) {
                marker.exclusive = Some(exclusive);
                updated = true;
            }
        }
        if let Some(properties) = update.properties {
            if properties != marker.properties {
                marker.properties = properties;
                properties_changed = true;
                updated = true;
            }
        }
        let is_exclusive = marker.is_exclusive();

        if let Some(range) = update.range {
            let range = Range::new(
                delegate.clip_position(range.start),
                delegate.clip_position(range.end),
            );
            if range != old_range {
                self.index.insert(id, range.start, range.end);
                self.index.set_exclusive(id, is_exclusive);
                updated = true;
            }
        }
        if was_exclusive != is_exclusive {
            self.index.set_exclusive(id, is_exclusive);
            updated = true;
        }

        self.emit_change_event(delegate, id, old_state, text_changed, properties_changed);
        if updated && !suppress_update {
            self.schedule_update(delegate);
        }
        Ok(updated)
    }

    /// Move a marker, planting its tail and marking it valid again
    pub fn set_marker_range(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        range: Range,
        reversed: Option<bool>,
        exclusive: Option<bool>,
    ) -> Result<bool> {
        let update = MarkerUpdate {
            range: Some(range),
            reversed,
            tailed: Some(true),
            valid: Some(true),
            exclusive,
            properties: None,
        };
        self.update_marker(delegate, id, update)
    }

    /// Move the head, flipping orientation when it crosses the tail
    pub fn set_marker_head_position(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        position: Point,
    ) -> Result<bool> {
        let position = delegate.clip_position(position);
        let old_range = self.index.get_range(id).ok_or(MarkerError::UnknownMarker(id))?;
        let marker = self.markers.get(&id).ok_or(MarkerError::UnknownMarker(id))?;

        let mut update = MarkerUpdate::default();
        if !marker.has_tail() {
            update.range = Some(Range::at(position));
        } else if marker.is_reversed() {
            if position < old_range.end {
                update.range = Some(Range::new(position, old_range.end));
            } else {
                update.reversed = Some(false);
                update.range = Some(Range::new(old_range.end, position));
            }
        } else if position < old_range.start {
            update.reversed = Some(true);
            update.range = Some(Range::new(position, old_range.start));
        } else {
            update.range = Some(Range::new(old_range.start, position));
        }
        self.update_marker(delegate, id, update)
    }

    /// Move the tail, planting it if needed and flipping orientation when it
    /// crosses the head
    pub fn set_marker_tail_position(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        position: Point,
    ) -> Result<bool> {
        let position = delegate.clip_position(position);
        let old_range = self.index.get_range(id).ok_or(MarkerError::UnknownMarker(id))?;
        let marker = self.markers.get(&id).ok_or(MarkerError::UnknownMarker(id))?;

        let mut update = MarkerUpdate {
            tailed: Some(true),
            ..MarkerUpdate::default()
        };
        if marker.is_reversed() {
            if position < old_range.start {
                update.reversed = Some(false);
                update.range = Some(Range::new(position, old_range.start));
            } else {
                update.range = Some(Range::new(old_range.start, position));
            }
        } else if position < old_range.end {
            update.range = Some(Range::new(position, old_range.end));
        } else {
            update.reversed = Some(true);
            update.range = Some(Range::new(old_range.end, position));
        }
        self.update_marker(delegate, id, update)
    }

    /// Collapse the marker onto its head and drop the tail
    pub fn clear_marker_tail(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
    ) -> Result<bool> {
        let head = self
            .get_marker_head_position(id)
            .ok_or(MarkerError::UnknownMarker(id))?;
        let update = MarkerUpdate {
            range: Some(Range::at(head)),
            tailed: Some(false),
            reversed: Some(false),
            ..MarkerUpdate::default()
        };
        self.update_marker(delegate, id, update)
    }

    /// Give a tailless marker a tail at its head
    pub fn plant_marker_tail(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
    ) -> Result<bool> {
        let marker = self.markers.get(&id).ok_or(MarkerError::UnknownMarker(id))?;
        if marker.has_tail() {
            return Ok(false);
        }
        let head = self
            .get_marker_head_position(id)
            .ok_or(MarkerError::UnknownMarker(id))?;
        let update = MarkerUpdate {
            range: Some(Range::at(head)),
            tailed: Some(true),
            ..MarkerUpdate::default()
        };
        self.update_marker(delegate, id, update)
    }

    /// Merge `properties` into the marker's properties
    pub fn set_marker_properties(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        properties: Properties,
    ) -> Result<bool> {
        let marker = self.markers.get(&id).ok_or(MarkerError::UnknownMarker(id))?;
        let mut merged = marker.properties.clone();
        merged.extend(properties);
        let update = MarkerUpdate {
            properties: Some(merged),
            ..MarkerUpdate::default()
        };
        self.update_marker(delegate, id, update)
    }

    /// Pin whether insertions at the marker's boundaries stay outside it
    pub fn set_marker_is_exclusive(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        exclusive: bool,
    ) -> Result<bool> {
        let update = MarkerUpdate {
            exclusive: Some(exclusive),
            ..MarkerUpdate::default()
        };
        self.update_marker(delegate, id, update)
    }

    // ------------------------------------------------------------------
    // Event subscription
    // ------------------------------------------------------------------

    /// Called once per unit of work in which markers were created, changed
    /// or destroyed. Re-query the layer for current state.
    pub fn on_did_update(
        &mut self,
        mut callback: impl FnMut(&mut MarkerLayer, &mut dyn MarkerLayerDelegate) + 'static,
    ) -> Subscription {
        self.events.subscribe(
            Channel::DidUpdate,
            Box::new(
                move |layer: &mut MarkerLayer,
                      delegate: &mut dyn MarkerLayerDelegate,
                      _event: &LayerEvent| callback(layer, delegate),
            ),
        )
    }

    /// Called synchronously for every new marker. Create notifications are
    /// only produced once somebody has subscribed here.
    pub fn on_did_create_marker(
        &mut self,
        mut callback: impl FnMut(&mut MarkerLayer, &mut dyn MarkerLayerDelegate, MarkerId) + 'static,
    ) -> Subscription {
        self.emit_create_marker_events = true;
        self.events.subscribe(
            Channel::DidCreateMarker,
            Box::new(
                move |layer: &mut MarkerLayer,
                      delegate: &mut dyn MarkerLayerDelegate,
                      event: &LayerEvent| {
                    if let LayerEvent::MarkerCreated(id) = event {
                        callback(layer, delegate, *id);
                    }
                },
            ),
        )
    }

    /// Called synchronously when the layer is destroyed
    pub fn on_did_destroy(
        &mut self,
        mut callback: impl FnMut(&mut MarkerLayer, &mut dyn MarkerLayerDelegate) + 'static,
    ) -> Subscription {
        self.events.subscribe(
            Channel::DidDestroy,
            Box::new(
                move |layer: &mut MarkerLayer,
                      delegate: &mut dyn MarkerLayerDelegate,
                      _event: &LayerEvent| callback(layer, delegate),
            ),
        )
    }

    /// Called synchronously when a marker's range, orientation, validity or
    /// properties change
    pub fn on_marker_did_change(
        &mut self,
        id: MarkerId,
        mut callback: impl FnMut(&mut MarkerLayer, &mut dyn MarkerLayerDelegate, &MarkerChangeEvent)
            + 'static,
    ) -> Result<Subscription> {
        if !self.markers.contains_key(&id) {
            return Err(MarkerError::UnknownMarker(id));
        }
        Ok(self.events.subscribe(
            Channel::MarkerDidChange(id),
            Box::new(
                move |layer: &mut MarkerLayer,
                      delegate: &mut dyn MarkerLayerDelegate,
                      event: &LayerEvent| {
                    if let LayerEvent::MarkerChanged(change) = event {
                        callback(layer, delegate, change);
                    }
                },
            ),
        ))
    }

    /// Called synchronously when a marker is destroyed
    pub fn on_marker_did_destroy(
        &mut self,
        id: MarkerId,
        mut callback: impl FnMut(&mut MarkerLayer, &mut dyn MarkerLayerDelegate, MarkerId) + 'static,
    ) -> Result<Subscription> {
        if !self.markers.contains_key(&id) {
            return Err(MarkerError::UnknownMarker(id));
        }
        Ok(self.events.subscribe(
            Channel::MarkerDidDestroy(id),
            Box::new(
                move |layer: &mut MarkerLayer,
                      delegate: &mut dyn MarkerLayerDelegate,
                      event: &LayerEvent| {
                    if let LayerEvent::MarkerDestroyed(id) = event {
                        callback(layer, delegate, *id);
                    }
                },
            ),
        ))
    }

    /// Remove a listener. Safe to call from inside a listener.
    pub fn dispose_subscription(&mut self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    pub fn markers_with_change_listeners(&self) -> BTreeSet<MarkerId> {
        self.events.markers_with_change_listeners()
    }

    pub fn markers_with_destroy_listeners(&self) -> BTreeSet<MarkerId> {
        self.events.markers_with_destroy_listeners()
    }

    // ------------------------------------------------------------------
    // Projection layers
    // ------------------------------------------------------------------

    /// Register a projection without taking ownership of it
    pub fn register_display_layer<T: DisplayMarkerLayer + 'static>(
        &mut self,
        layer: &Rc<RefCell<T>>,
    ) -> DisplayLayerId {
        let layer: Rc<RefCell<dyn DisplayMarkerLayer>> = layer.clone();
        self.display_layers.register(layer)
    }

    pub fn unregister_display_layer(&mut self, id: DisplayLayerId) -> bool {
        self.display_layers.unregister(id)
    }

    pub fn display_layer_count(&self) -> usize {
        self.display_layers.len()
    }

    // ------------------------------------------------------------------
    // Coalesced updates
    // ------------------------------------------------------------------

    /// Whether an update notification is waiting for the end of the quantum
    pub fn has_pending_update(&self) -> bool {
        self.update_pending
    }

    /// Deliver the pending update notification, if there is one
    ///
    /// The host calls this once the current unit of work is over. Returns
    /// whether a notification was delivered.
    pub fn emit_update_event(&mut self, delegate: &mut dyn MarkerLayerDelegate) -> bool {
        if !self.update_pending || self.destroyed {
            self.update_pending = false;
            return false;
        }
        self.update_pending = false;
        self.emit(delegate, Channel::DidUpdate, LayerEvent::Updated);
        true
    }

    /// Mark the layer dirty, asking the delegate for a flush on the first change
    pub(super) fn schedule_update(&mut self, delegate: &mut dyn MarkerLayerDelegate) {
        if self.destroyed || self.update_pending {
            return;
        }
        self.update_pending = true;
        delegate.markers_updated(self.id);
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub(super) fn emit(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        channel: Channel,
        event: LayerEvent,
    ) {
        let mut next = self.events.begin_dispatch(channel, event);
        while let Some((mut handlers, event)) = next {
            for (_, handler) in handlers.iter_mut() {
                handler(self, delegate, &event);
            }
            next = self.events.end_dispatch(channel, handlers);
        }
    }

    /// Notify change listeners if the marker's observable state moved
    pub(super) fn emit_change_event(
        &mut self,
        delegate: &mut dyn MarkerLayerDelegate,
        id: MarkerId,
        old: MarkerState,
        text_changed: bool,
        properties_changed: bool,
    ) {
        let channel = Channel::MarkerDidChange(id);
        if !self.events.has_listeners(channel) {
            return;
        }
        let (Some(marker), Some(range)) = (self.markers.get(&id), self.index.get_range(id)) else {
            return;
        };
        let new = MarkerState::of(marker, range);
        if !properties_changed && new == old {
            return;
        }

        let event = MarkerChangeEvent {
            marker: id,
            old_range: old.range,
            new_range: new.range,
            old_head: old.head,
            new_head: new.head,
            old_tail: old.tail,
            new_tail: new.tail,
            was_valid: old.valid,
            is_valid: new.valid,
            had_tail: old.tailed,
            has_tail: new.tailed,
            old_properties: old.properties,
            new_properties: new.properties,
            text_changed,
        };
        self.emit(delegate, channel, LayerEvent::MarkerChanged(event));
    }
}

impl fmt::Debug for MarkerLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerLayer")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("markers", &self.markers.len())
            .field("events", &self.events)
            .field("display_layers", &self.display_layers)
            .field("update_pending", &self.update_pending)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
