//! Speculative slot reservations.
//!
//! Components that pull work in batches reserve slots before they know how many
//! tasks they will actually dispatch, then release the reservation once the batch
//! has been handed off. Records live in a concurrent map keyed by a caller token.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

/// An outstanding hold on `taken` slots at one tier.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Caller-supplied token.
    pub id: String,
    /// Tier reserved against.
    pub priority: usize,
    /// Slots set aside.
    pub taken: i64,
    /// Creation time, diagnostics only.
    pub start: Instant,
}

impl Reservation {
    /// Time since the reservation was made.
    pub fn age(&self) -> Duration {
        self.start.elapsed()
    }

    /// Serializable view for statistics export.
    pub fn summary(&self) -> ReservationSummary {
        ReservationSummary {
            id: self.id.clone(),
            priority: self.priority,
            taken: self.taken,
            age_ms: u64::try_from(self.age().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Exported form of a [`Reservation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationSummary {
    /// Token.
    pub id: String,
    /// Tier.
    pub priority: usize,
    /// Slots held.
    pub taken: i64,
    /// Age in milliseconds at snapshot time.
    pub age_ms: u64,
}

/// Generate a fresh reservation token for callers without a natural key.
pub fn reservation_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Concurrent map of outstanding reservations.
#[derive(Debug, Default)]
pub struct ReservationRegistry {
    entries: DashMap<String, Reservation>,
}

impl ReservationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the token is already outstanding.
    pub fn insert(&self, reservation: Reservation) -> bool {
        match self.entries.entry(reservation.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(reservation);
                true
            }
        }
    }

    /// Remove and return the record for `id`.
    pub fn remove(&self, id: &str) -> Option<Reservation> {
        self.entries.remove(id).map(|(_, r)| r)
    }

    /// Whether `id` is outstanding.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of outstanding reservations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens of reservations at least `age` old.
    pub fn older_than(&self, age: Duration) -> Vec<String> {
        self.entries
            .iter()
            .filter(|r| r.age() >= age)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Summaries of every outstanding reservation, oldest first.
    pub fn summaries(&self) -> Vec<ReservationSummary> {
        let mut out: Vec<_> = self.entries.iter().map(|r| r.summary()).collect();
        out.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));
        out
    }
}
