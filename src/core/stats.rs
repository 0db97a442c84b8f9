//! Read-only statistics snapshot for telemetry export.

use serde::Serialize;

use super::reservation::ReservationSummary;

/// Snapshot of [`TaskAvailability`](super::TaskAvailability) counters.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityStats {
    /// Global ceiling.
    pub tasks_max_concurrent: i64,
    /// Remaining global capacity.
    pub slots_available: i64,
    /// Active non-internal tasks.
    pub active: i64,
    /// Active internal tasks.
    pub internal_active: i64,
    /// Slots held by reservations.
    pub reserved: i64,
    /// Tasks reclaimed by a watchdog, all tiers.
    pub killed: i64,
    /// Reclaimed tasks that later reported completion, all tiers.
    pub killed_did_return: i64,
    /// Per-tier debug strings, lowest tier first.
    pub levels: Vec<String>,
    /// Debug string of the internal tier.
    pub internal: String,
    /// Outstanding reservations, oldest first.
    pub reservations: Vec<ReservationSummary>,
}

impl AvailabilityStats {
    /// Render as JSON for a metrics collaborator.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
