//! Dependent projection layers
//!
//! Display layers project buffer markers into screen coordinates. They
//! register with a buffer marker layer without being owned by it, and must
//! hear about clears, destroyed markers and the layer's own destruction
//! before the layer drops its structures.

use super::MarkerId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// One-way notifications a buffer marker layer sends its projections
pub trait DisplayMarkerLayer {
    fn did_clear_buffer_marker_layer(&mut self);
    fn destroy_marker(&mut self, id: MarkerId);
    fn destroy(&mut self);
}

/// Registration handle returned by `MarkerLayer::register_display_layer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayLayerId(u64);

type DisplayLayerRef = Rc<RefCell<dyn DisplayMarkerLayer>>;

#[derive(Default)]
pub(crate) struct DisplayLayers {
    next_id: u64,
    layers: BTreeMap<DisplayLayerId, Weak<RefCell<dyn DisplayMarkerLayer>>>,
}

impl DisplayLayers {
    pub(crate) fn register(&mut self, layer: DisplayLayerRef) -> DisplayLayerId {
        self.next_id += 1;
        let id = DisplayLayerId(self.next_id);
        self.layers.insert(id, Rc::downgrade(&layer));
        id
    }

    pub(crate) fn unregister(&mut self, id: DisplayLayerId) -> bool {
        self.layers.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.layers.len()
    }

    /// Live projections, copied before dispatch. Dropped ones are pruned.
    fn live(&mut self) -> Vec<DisplayLayerRef> {
        self.layers.retain(|_, layer| layer.strong_count() > 0);
        self.layers.values().filter_map(Weak::upgrade).collect()
    }

    fn notify(&mut self, mut notification: impl FnMut(&mut dyn DisplayMarkerLayer)) {
        for layer in self.live() {
            match layer.try_borrow_mut() {
                Ok(mut layer) => notification(&mut *layer),
                Err(_) => log::warn!("display layer is busy, skipping notification"),
            }
        }
    }

    pub(crate) fn did_clear(&mut self) {
        self.notify(|layer| layer.did_clear_buffer_marker_layer());
    }

    pub(crate) fn destroy_marker(&mut self, id: MarkerId) {
        self.notify(|layer| layer.destroy_marker(id));
    }

    /// Destroy every projection and forget them
    pub(crate) fn destroy_all(&mut self) {
        self.notify(|layer| layer.destroy());
        self.layers.clear();
    }
}

impl fmt::Debug for DisplayLayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayLayers")
            .field("registered", &self.layers.len())
            .finish()
    }
}
