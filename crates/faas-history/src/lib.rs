//! Bounded, concurrently readable log of invocation activity.
//!
//! Every accepted invocation contributes one `OPEN` and one `CLOSE` event.
//! The log keeps the most recent `capacity` events and evicts the oldest
//! first, so it should be sized at least as large as the peak number of
//! concurrently active sandboxes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Position in the global arrival order, starting at 0.
    pub seq: u64,
    pub name: String,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

/// What `/history` serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub capacity: usize,
    pub events: Vec<HistoryEvent>,
}

#[derive(Debug, Default)]
struct Ring {
    events: VecDeque<HistoryEvent>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct HistoryTracker {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl HistoryTracker {
    /// A tracker of capacity 0 accepts events and keeps none of them.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: Mutex::new(Ring {
                events: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_access(&self, name: &str, kind: EventKind) {
        let mut ring = self.lock();
        let seq = ring.next_seq;
        ring.next_seq += 1;

        if self.capacity == 0 {
            return;
        }
        if ring.events.len() == self.capacity {
            if let Some(evicted) = ring.events.pop_front() {
                trace!(seq = evicted.seq, name = %evicted.name, "Evicted history event");
            }
        }
        ring.events.push_back(HistoryEvent {
            seq,
            name: name.to_string(),
            kind,
            at: Utc::now(),
        });
    }

    /// Oldest-first copy of the log at one instant.
    pub fn snapshot(&self) -> HistorySnapshot {
        let events = self.lock().events.iter().cloned().collect();
        HistorySnapshot {
            capacity: self.capacity,
            events,
        }
    }

    /// Records `OPEN` for `name` now and `CLOSE` when the returned scope is
    /// dropped, on whatever path that happens.
    pub fn begin(self: &Arc<Self>, name: impl Into<String>) -> InvocationScope {
        let name = name.into();
        self.record_access(&name, EventKind::Open);
        InvocationScope {
            tracker: Arc::clone(self),
            name,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // A panicking writer cannot leave the ring half-updated, so the
        // data behind a poisoned lock is still sound.
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lifetime of one invocation in the history log.
#[derive(Debug)]
#[must_use = "dropping the scope records CLOSE immediately"]
pub struct InvocationScope {
    tracker: Arc<HistoryTracker>,
    name: String,
}

impl InvocationScope {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        self.tracker.record_access(&self.name, EventKind::Close);
    }
}
