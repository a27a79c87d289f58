//! Listener registry for marker layers
//!
//! Two kinds of notification exist. Create, destroy and marker change/destroy
//! events are synchronous and delivered in-line. The "layer updated" signal
//! is coalesced: any number of changes in one unit of work produce one call.
//!
//! Handlers receive the layer and the delegate, so they may mutate the layer
//! while it dispatches. Each pass iterates the handlers that were registered
//! when it started; events raised on a channel that is already dispatching
//! are queued and delivered after the current pass.

use super::delegate::MarkerLayerDelegate;
use super::layer::MarkerLayer;
use super::marker::Properties;
use super::MarkerId;
use crate::text::{Point, Range};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// What changed on a marker, before and after
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerChangeEvent {
    pub marker: MarkerId,
    pub old_range: Range,
    pub new_range: Range,
    pub old_head: Point,
    pub new_head: Point,
    pub old_tail: Point,
    pub new_tail: Point,
    pub was_valid: bool,
    pub is_valid: bool,
    pub had_tail: bool,
    pub has_tail: bool,
    pub old_properties: Properties,
    pub new_properties: Properties,
    /// The change was caused by an edit to the buffer's text
    pub text_changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LayerEvent {
    Updated,
    MarkerCreated(MarkerId),
    Destroyed,
    MarkerChanged(MarkerChangeEvent),
    MarkerDestroyed(MarkerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Channel {
    DidUpdate,
    DidCreateMarker,
    DidDestroy,
    MarkerDidChange(MarkerId),
    MarkerDidDestroy(MarkerId),
}

/// Handle for a registered listener; pass it to `dispose_subscription`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    channel: Channel,
    id: u64,
}

pub(crate) type Handler =
    Box<dyn FnMut(&mut MarkerLayer, &mut dyn MarkerLayerDelegate, &LayerEvent)>;

pub(crate) type Handlers = Vec<(u64, Handler)>;

#[derive(Default)]
pub(crate) struct Listeners {
    entries: Handlers,
    dispatching: bool,
    removed_while_dispatching: BTreeSet<u64>,
    queued: VecDeque<LayerEvent>,
}

impl Listeners {
    pub(crate) fn into_handlers(self) -> Handlers {
        self.entries
    }
}

#[derive(Default)]
pub(crate) struct LayerEvents {
    next_subscription: u64,
    channels: BTreeMap<Channel, Listeners>,
    disposed: bool,
}

impl LayerEvents {
    /// Register a handler. After `dispose` the handler is dropped at once.
    pub(crate) fn subscribe(&mut self, channel: Channel, handler: Handler) -> Subscription {
        self.next_subscription += 1;
        let subscription = Subscription {
            channel,
            id: self.next_subscription,
        };
        if !self.disposed {
            self.channels
                .entry(channel)
                .or_default()
                .entries
                .push((subscription.id, handler));
        }
        subscription
    }

    pub(crate) fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let Some(listeners) = self.channels.get_mut(&subscription.channel) else {
            return false;
        };
        let before = listeners.entries.len();
        listeners.entries.retain(|(id, _)| *id != subscription.id);
        if listeners.entries.len() != before {
            if listeners.entries.is_empty() && !listeners.dispatching {
                self.channels.remove(&subscription.channel);
            }
            return true;
        }
        if listeners.dispatching {
            return listeners.removed_while_dispatching.insert(subscription.id);
        }
        false
    }

    pub(crate) fn has_listeners(&self, channel: Channel) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Markers that currently have change listeners
    pub(crate) fn markers_with_change_listeners(&self) -> BTreeSet<MarkerId> {
        self.channels
            .keys()
            .filter_map(|channel| match channel {
                Channel::MarkerDidChange(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Markers that currently have destroy listeners
    pub(crate) fn markers_with_destroy_listeners(&self) -> BTreeSet<MarkerId> {
        self.channels
            .keys()
            .filter_map(|channel| match channel {
                Channel::MarkerDidDestroy(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Detach a channel's listeners entirely
    pub(crate) fn take_channel(&mut self, channel: Channel) -> Option<Listeners> {
        self.channels.remove(&channel)
    }

    /// Start delivering `event`. Returns the handlers to call, or `None` when
    /// nobody listens or the event was queued behind a running dispatch.
    pub(crate) fn begin_dispatch(
        &mut self,
        channel: Channel,
        event: LayerEvent,
    ) -> Option<(Handlers, LayerEvent)> {
        let listeners = self.channels.get_mut(&channel)?;
        if listeners.dispatching {
            listeners.queued.push_back(event);
            return None;
        }
        listeners.dispatching = true;
        Some((std::mem::take(&mut listeners.entries), event))
    }

    /// Hand the handlers back after a pass, merging registrations and
    /// removals that happened meanwhile. Returns the next queued event, if
    /// any, together with the handlers to deliver it to.
    pub(crate) fn end_dispatch(
        &mut self,
        channel: Channel,
        mut handlers: Handlers,
    ) -> Option<(Handlers, LayerEvent)> {
        // The channel disappears when the marker or the layer is destroyed
        let listeners = self.channels.get_mut(&channel)?;

        let removed = std::mem::take(&mut listeners.removed_while_dispatching);
        handlers.retain(|(id, _)| !removed.contains(id));
        handlers.append(&mut listeners.entries);

        if let Some(next) = listeners.queued.pop_front() {
            return Some((handlers, next));
        }

        listeners.dispatching = false;
        if handlers.is_empty() {
            self.channels.remove(&channel);
        } else {
            listeners.entries = handlers;
        }
        None
    }

    /// Drop every listener and refuse new ones
    pub(crate) fn dispose(&mut self) {
        self.channels.clear();
        self.disposed = true;
    }
}

impl fmt::Debug for LayerEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerEvents")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("disposed", &self.disposed)
            .finish()
    }
}
