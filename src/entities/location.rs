// 📍 Location Entity - Identity + append-only status log
//
// "The key is IDENTITY, the event log is the VALUE history"
//
// A location is first seen either with its canonical code (e.g. an ICAO
// airport code) or by name only. Name-only locations live under a
// provisional slug key until the code shows up, then get promoted or merged.

use crate::deduplication::DuplicatePolicy;
use crate::normalize::slugify;
use crate::ordering::OrderingStrategy;
use std::cmp::Ordering;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Operating normally (restriction lifted)
    Open,

    /// Restriction in force
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Closed => "closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STATUS EVENT
// ============================================================================

/// One observed transition. Immutable once appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Publication time of the notice (always UTC, serialized with offset)
    #[serde(alias = "ts")]
    pub timestamp: DateTime<Utc>,

    pub status: Status,

    /// Stream sequence number of the notice, when the feed had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl StatusEvent {
    pub fn new(timestamp: DateTime<Utc>, status: Status) -> Self {
        StatusEvent {
            timestamp,
            status,
            sequence: None,
        }
    }

    /// Builder pattern: attach the stream sequence number
    pub fn with_sequence(mut self, sequence: Option<u64>) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn opened(timestamp: DateTime<Utc>) -> Self {
        StatusEvent::new(timestamp, Status::Open)
    }

    pub fn closed(timestamp: DateTime<Utc>) -> Self {
        StatusEvent::new(timestamp, Status::Closed)
    }
}

// ============================================================================
// ENTITY KEY
// ============================================================================

/// Identity of a location record.
///
/// Canonical keys are the code itself ("UUEE"); provisional keys are the
/// slug of the display name ("example-city").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    Canonical(String),
    Provisional(String),
}

impl EntityKey {
    pub fn canonical(code: &str) -> Self {
        EntityKey::Canonical(code.to_string())
    }

    /// Provisional key derived from a display name
    pub fn provisional_for(name: &str) -> Self {
        EntityKey::Provisional(slugify(name))
    }

    /// Key for a candidate: canonical when a code is known
    pub fn resolve(name: &str, identifier: Option<&str>) -> Self {
        match identifier {
            Some(code) => EntityKey::canonical(code),
            None => EntityKey::provisional_for(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntityKey::Canonical(code) => code,
            EntityKey::Provisional(slug) => slug,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            EntityKey::Canonical(code) => Some(code),
            EntityKey::Provisional(_) => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, EntityKey::Provisional(_))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENTITY RECORD
// ============================================================================

/// Persisted state of one location.
///
/// Invariants:
/// - `events` is sorted ascending by timestamp (stable for equal timestamps)
/// - `current_status` is the status of the last event when `events` is non-empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Display name as first observed
    pub name: String,

    /// Canonical code, `None` while provisional
    #[serde(default)]
    pub identifier: Option<String>,

    #[serde(alias = "current", default = "default_status")]
    pub current_status: Status,

    #[serde(default)]
    pub events: Vec<StatusEvent>,
}

fn default_status() -> Status {
    Status::Open
}

impl EntityRecord {
    /// Empty record (no events yet)
    pub fn new(name: &str, identifier: Option<&str>) -> Self {
        EntityRecord {
            name: name.to_string(),
            identifier: identifier.map(str::to_string),
            current_status: Status::Open,
            events: Vec::new(),
        }
    }

    /// Append an event at its place in the log order.
    ///
    /// Returns `false` when the policy suppressed it as a duplicate.
    pub fn append(
        &mut self,
        event: StatusEvent,
        policy: DuplicatePolicy,
        order: OrderingStrategy,
    ) -> bool {
        if policy.suppresses() && self.events.contains(&event) {
            return false;
        }

        // Upper bound: events that compare equal keep arrival order
        let position = self
            .events
            .partition_point(|e| order.compare_events(e, &event) != Ordering::Greater);
        self.events.insert(position, event);
        self.refresh_status();
        true
    }

    /// Union another record's log into this one (used by merges).
    ///
    /// Returns the number of events taken over from `other`.
    pub fn absorb(
        &mut self,
        other: EntityRecord,
        policy: DuplicatePolicy,
        order: OrderingStrategy,
    ) -> usize {
        let mut taken = 0;
        for event in other.events {
            if self.append(event, policy, order) {
                taken += 1;
            }
        }
        taken
    }

    /// Restore the record invariants after loading foreign data
    /// or switching the log order
    pub fn normalize(&mut self, order: OrderingStrategy) {
        self.events.sort_by(|a, b| order.compare_events(a, b));
        self.refresh_status();
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_closed(&self) -> bool {
        self.current_status == Status::Closed
    }

    fn refresh_status(&mut self) {
        if let Some(last) = self.events.last() {
            self.current_status = last.status;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
