//! Change notifications emitted after successful mutations
//!
//! Whichever surface renders the store (student page, staff console)
//! subscribes here and re-reads on receipt. Exactly one event is published
//! per successful mutating call; failed calls publish nothing.
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Order,
    Student,
    MenuItem,
    Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub id: String,
}

#[derive(Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("change feed lock poisoned")
            .push(tx);
        rx
    }

    /// Fan the event out, dropping subscribers whose receiver has gone away.
    pub fn publish(&self, kind: EntityKind, id: &str) {
        let event = ChangeEvent {
            kind,
            id: id.to_string(),
        };
        self.subscribers
            .lock()
            .expect("change feed lock poisoned")
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
