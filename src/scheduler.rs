//! Deferred delivery of coalesced layer updates
//!
//! Layers only mark themselves dirty. The buffer collects dirty layers in an
//! [`UpdateQueue`] and asks its [`UpdateScheduler`] once per quantum for a
//! flush; whoever owns the quantum then calls `TextBuffer::flush_updates`.

use crate::markers::LayerId;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Decides when the current unit of work is over
pub trait UpdateScheduler: fmt::Debug {
    /// Called when the first layer becomes dirty since the last flush
    fn request_flush(&mut self);
}

/// Scheduler for hosts that flush by hand
///
/// Counts requests; clones share the counter, so a test can keep one and
/// hand the other to the buffer.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    requests: Rc<Cell<usize>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush requests seen so far
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl UpdateScheduler for ManualScheduler {
    fn request_flush(&mut self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// Dirty layers waiting for the end of the quantum
#[derive(Debug, Clone, Default)]
pub struct UpdateQueue {
    pending: BTreeSet<LayerId>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a layer. Returns true when the queue was empty before, i.e.
    /// when a flush has to be requested.
    pub fn push(&mut self, layer: LayerId) -> bool {
        let was_empty = self.pending.is_empty();
        self.pending.insert(layer);
        was_empty
    }

    pub fn remove(&mut self, layer: LayerId) -> bool {
        self.pending.remove(&layer)
    }

    pub fn contains(&self, layer: LayerId) -> bool {
        self.pending.contains(&layer)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Empty the queue, in layer id order
    pub fn take(&mut self) -> Vec<LayerId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}
