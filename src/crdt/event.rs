//! Change notifications.
//!
//! Observers register interest in a [`Label`] under an [`ObserverId`] they
//! choose. When a tree commits a mutation it hands the matching [`Event`]s to
//! the grid, which files a copy in the mailbox of every subscribed observer.
//! Observers collect their mail with [`EventGrid::take`]; nothing is called
//! back, so the grid holds no references into the document layer.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::address::Slot;
use crate::crdt::tree::NodeId;

/// What kind of change an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    Insert,
    Delete,
    ChildInsert,
    ChildDelete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `child` was adopted into `position` of `node`.
    Insert {
        node: NodeId,
        position: Slot,
        child: NodeId,
    },
    /// `position` of `node` was tombstoned.
    Delete { node: NodeId, position: usize },
    /// Something below `ancestor` gained a child; `node` is where.
    ChildInsert { ancestor: NodeId, node: NodeId },
    /// Something below `ancestor` was tombstoned; `node` is where.
    ChildDelete { ancestor: NodeId, node: NodeId },
}

impl Event {
    pub fn label(&self) -> Label {
        return match self {
            Event::Insert { .. } => Label::Insert,
            Event::Delete { .. } => Label::Delete,
            Event::ChildInsert { .. } => Label::ChildInsert,
            Event::ChildDelete { .. } => Label::ChildDelete,
        };
    }
}

/// Caller-chosen observer handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

#[derive(Clone, Debug, Default)]
pub struct EventGrid {
    subscribers: FxHashMap<Label, SmallVec<[ObserverId; 4]>>,
    mailboxes: FxHashMap<ObserverId, Vec<Event>>,
}

impl EventGrid {
    pub fn new() -> EventGrid {
        return EventGrid::default();
    }

    /// Subscribe `observer` to events labelled `label`. Registering twice is
    /// a no-op.
    pub fn register(&mut self, label: Label, observer: ObserverId) {
        let subscribers = self.subscribers.entry(label).or_default();
        if !subscribers.contains(&observer) {
            subscribers.push(observer);
        }
    }

    /// Drop every subscription and any undelivered mail of `observer`.
    pub fn unregister(&mut self, observer: ObserverId) {
        for subscribers in self.subscribers.values_mut() {
            subscribers.retain(|id| *id != observer);
        }
        self.mailboxes.remove(&observer);
    }

    /// Deliver an event to everyone subscribed to its label.
    pub fn happen(&mut self, event: Event) {
        let Some(subscribers) = self.subscribers.get(&event.label()) else {
            return;
        };
        for observer in subscribers {
            self.mailboxes.entry(*observer).or_default().push(event.clone());
        }
    }

    /// Take everything delivered to `observer` so far, oldest first.
    pub fn take(&mut self, observer: ObserverId) -> Vec<Event> {
        return self.mailboxes.remove(&observer).unwrap_or_default();
    }
}
