// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed event bus owned by a [`Taxonomy`](crate::Taxonomy).
//!
//! Each [`EventKind`] has its own listener list. Listeners run synchronously, in subscription
//! order, at the point the underlying state change completes. Every listener of a kind sees
//! every event of that kind.
//!
//! ## Minimal example
//!
//! ```
//! use taxonomy_tree::{EventBus, EventKind, TaxId, TaxonomyEvent};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let mut bus = EventBus::new();
//! let sink = seen.clone();
//! bus.on(EventKind::SpeciesRequested, move |event| {
//!     if let TaxonomyEvent::SpeciesRequested(taxid) = event {
//!         sink.borrow_mut().push((*taxid).clone());
//!     }
//! });
//!
//! bus.emit(&TaxonomyEvent::SpeciesRequested(&TaxId::from(562_u64)));
//! bus.emit(&TaxonomyEvent::RemoveSpecies(&TaxId::from(9_u64)));
//! assert_eq!(*seen.borrow(), vec![TaxId::from(562_u64)]);
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;

use crate::display::DisplayId;
use crate::types::TaxId;

/// Event names a listener can subscribe to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A hierarchy was ingested.
    TaxonomyLoaded,
    /// The active order changed, by a sort selection or a committed reorder.
    ChangeOrder,
    /// One organism should be fetched.
    SpeciesRequested,
    /// Several organisms should be fetched in one go.
    MultipleSpeciesRequested,
    /// An organism should be removed from the comparison.
    RemoveSpecies,
}

/// Event payloads, borrowed from the emitting [`Taxonomy`](crate::Taxonomy).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaxonomyEvent<'a> {
    /// Root of the display tree after the load.
    TaxonomyLoaded {
        /// Root position of the rebuilt display tree.
        root: DisplayId,
    },
    /// The new active order.
    ChangeOrder(&'a [u32]),
    /// Organism to fetch.
    SpeciesRequested(&'a TaxId),
    /// Organisms to fetch.
    MultipleSpeciesRequested(&'a [TaxId]),
    /// Organism to remove.
    RemoveSpecies(&'a TaxId),
}

impl TaxonomyEvent<'_> {
    /// Name of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaxonomyLoaded { .. } => EventKind::TaxonomyLoaded,
            Self::ChangeOrder(_) => EventKind::ChangeOrder,
            Self::SpeciesRequested(_) => EventKind::SpeciesRequested,
            Self::MultipleSpeciesRequested(_) => EventKind::MultipleSpeciesRequested,
            Self::RemoveSpecies(_) => EventKind::RemoveSpecies,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&TaxonomyEvent<'_>)>;

/// Listener lists, one per [`EventKind`].
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(EventKind, usize)> =
            self.listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to `kind`.
    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&TaxonomyEvent<'_>) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Unsubscribe a listener. Returns `false` if it was not subscribed.
    pub fn off(&mut self, id: ListenerId) -> bool {
        for list in self.listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(l, _)| *l == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener of its kind. Returns how many listeners ran.
    pub fn emit(&mut self, event: &TaxonomyEvent<'_>) -> usize {
        let kind = event.kind();
        let Some(list) = self.listeners.get_mut(&kind) else {
            return 0;
        };
        tracing::trace!(?kind, listeners = list.len(), "emit");
        for (_, listener) in list.iter_mut() {
            listener(event);
        }
        list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;

    fn recorder(
        bus: &mut EventBus,
        kind: EventKind,
        log: &Rc<RefCell<Vec<u32>>>,
        tag: u32,
    ) -> ListenerId {
        let log = log.clone();
        bus.on(kind, move |_| log.borrow_mut().push(tag))
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        recorder(&mut bus, EventKind::ChangeOrder, &log, 1);
        recorder(&mut bus, EventKind::ChangeOrder, &log, 2);
        recorder(&mut bus, EventKind::RemoveSpecies, &log, 3);

        assert_eq!(bus.emit(&TaxonomyEvent::ChangeOrder(&[1, 0])), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(bus.listener_count(EventKind::ChangeOrder), 2);
        assert_eq!(bus.listener_count(EventKind::TaxonomyLoaded), 0);
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        recorder(&mut bus, EventKind::SpeciesRequested, &log, 1);
        recorder(&mut bus, EventKind::SpeciesRequested, &log, 2);
        recorder(&mut bus, EventKind::SpeciesRequested, &log, 3);

        let taxid = TaxId::from(1_u64);
        assert_eq!(bus.emit(&TaxonomyEvent::SpeciesRequested(&taxid)), 3);
        assert_eq!(bus.emit(&TaxonomyEvent::SpeciesRequested(&taxid)), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(bus.emit(&TaxonomyEvent::RemoveSpecies(&taxid)), 0);
    }

    #[test]
    fn off_unsubscribes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let a = recorder(&mut bus, EventKind::MultipleSpeciesRequested, &log, 1);
        recorder(&mut bus, EventKind::MultipleSpeciesRequested, &log, 2);
        assert!(bus.off(a));
        assert!(!bus.off(a));
        bus.emit(&TaxonomyEvent::MultipleSpeciesRequested(&[]));
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn payload_kinds() {
        let taxid = TaxId::from(7_u64);
        assert_eq!(TaxonomyEvent::RemoveSpecies(&taxid).kind(), EventKind::RemoveSpecies);
        assert_eq!(TaxonomyEvent::ChangeOrder(&[]).kind(), EventKind::ChangeOrder);
    }
}
