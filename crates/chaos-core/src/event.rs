//! Monitor events and their single-slot delivery channel
//!
//! Each entity has a queue of capacity one. Emitting never blocks: while an
//! unread event is pending, new events are dropped. Terminal conditions are
//! re-emitted on every tick, so they surface as long as the monitor runs.

use crate::types::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, error::TrySendError};

/// A status report from a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Reporting entity
    pub entity: EntityId,
    /// Matched value or error text
    pub message: String,
    /// Runtime or health failure
    pub is_error: bool,
    /// A success filter has matched
    pub is_done: bool,
    /// A fail filter has matched (and no success filter)
    pub is_fail: bool,
    /// Extra context such as phase and budget
    pub metadata: BTreeMap<String, String>,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Outcome report
    #[must_use]
    pub fn outcome(entity: EntityId, message: impl Into<String>, is_done: bool, is_fail: bool) -> Self {
        Self {
            entity,
            message: message.into(),
            is_error: false,
            is_done,
            is_fail,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Error report
    #[must_use]
    pub fn error(entity: EntityId, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::outcome(entity, message, false, false)
        }
    }

    /// With metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Done, failed or errored
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.is_done || self.is_fail || self.is_error
    }
}

/// Create a capacity-one event channel
#[must_use]
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(1);
    (EventSender { tx }, EventStream { rx })
}

/// Producer side; never blocks
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Deliver `event` if the slot is free
    ///
    /// Returns `false` when the event was dropped.
    pub fn emit(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::debug!(entity = %event.entity, "event slot occupied, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Consumer side
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    /// Wait for the next event; `None` once the monitor is gone
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the pending event, if any
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
