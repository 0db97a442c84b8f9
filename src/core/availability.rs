//! The admission controller.
//!
//! [`TaskAvailability`] answers "can this task run now, and at what accounting
//! cost" for every producer in the runtime. It never blocks, never spawns and
//! owns no loop: every operation is a handful of atomic updates plus at most one
//! concurrent-map access. Capacity is soft. A positive [`TaskAvailability::level`]
//! is a hint, and two racing callers may both increment past the target.
//!
//! Tiers are indexed `0..levels`. When the shared pool is exhausted a tier falls
//! back to its own bulkhead, then to the bulkheads of lower-indexed tiers, never
//! to higher ones.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, error, warn};

use super::error::AdmissionError;
use super::priority_level::PriorityLevelState;
use super::reservation::{Reservation, ReservationRegistry, ReservationSummary};
use super::stats::AvailabilityStats;
use super::tracker::{ProcessSlot, TaskId, TaskTracker};

/// Lowest tier index.
pub const LEVEL_MIN: usize = 0;

/// Admission controller owning per-tier state, the active-slot registry and the
/// reservation registry.
#[derive(Debug)]
pub struct TaskAvailability {
    levels: Vec<PriorityLevelState>,
    internal: PriorityLevelState,
    max_concurrent: i64,
    /// Slot -> task, used to reject double registration and to make decrement idempotent.
    active: DashMap<ProcessSlot, TaskId>,
    /// Registered non-internal tasks.
    active_user: AtomicI64,
    reserved_total: AtomicI64,
    next_slot: AtomicU64,
    reservations: ReservationRegistry,
}

impl TaskAvailability {
    /// Create a controller with `levels` tiers sharing `max_concurrent` slots.
    ///
    /// `levels` below one is raised to one.
    pub fn new(levels: usize, max_concurrent: usize) -> Self {
        let levels = if levels == 0 {
            warn!("task availability requires at least one level; using 1");
            1
        } else {
            levels
        };
        let max_concurrent = i64::try_from(max_concurrent).unwrap_or(i64::MAX);

        tracing::info!(levels, max_concurrent, "task availability initialized");

        Self {
            levels: (0..levels).map(PriorityLevelState::new).collect(),
            internal: PriorityLevelState::new(levels),
            max_concurrent,
            active: DashMap::new(),
            active_user: AtomicI64::new(0),
            reserved_total: AtomicI64::new(0),
            next_slot: AtomicU64::new(1),
            reservations: ReservationRegistry::new(),
        }
    }

    /// Number of tiers.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Highest tier index.
    pub fn level_max(&self) -> usize {
        self.levels.len() - 1
    }

    /// Global ceiling across all non-internal tiers.
    pub const fn max_concurrent(&self) -> i64 {
        self.max_concurrent
    }

    /// State for one tier.
    pub fn level_state(&self, level: usize) -> Option<&PriorityLevelState> {
        self.levels.get(level)
    }

    /// State for internal work.
    pub const fn internal_state(&self) -> &PriorityLevelState {
        &self.internal
    }

    /// Active non-internal tasks.
    pub fn active_count(&self) -> i64 {
        self.active_user.load(Ordering::Acquire)
    }

    /// Slots held by all outstanding reservations.
    pub fn reserved_total(&self) -> i64 {
        self.reserved_total.load(Ordering::Acquire)
    }

    /// Remaining global capacity: `max_concurrent - active non-internal tasks`.
    ///
    /// May be negative while transiently oversubscribed.
    pub fn count(&self) -> i64 {
        self.max_concurrent - self.active_count()
    }

    /// Whether the tracker currently holds a registered slot.
    pub fn is_registered(&self, tracker: &TaskTracker) -> bool {
        tracker
            .process_slot()
            .is_some_and(|slot| self.active.contains_key(&slot))
    }

    /// Configure the dedicated capacity and burst overage of a tier.
    ///
    /// Returns `false` for an unknown tier or a negative slot count or overage.
    /// Calling again overwrites the previous configuration.
    pub fn bulkhead_reserve(&self, level: usize, slot_count: i64, overage: i64) -> bool {
        if slot_count < 0 || overage < 0 {
            warn!(level, slot_count, overage, "rejected negative bulkhead");
            return false;
        }
        let Some(state) = self.levels.get(level) else {
            warn!(level, max = self.level_max(), "rejected bulkhead for unknown level");
            return false;
        };
        state.configure(slot_count, overage);
        debug!(level, slot_count, overage, "bulkhead configured");
        true
    }

    /// Slots a caller may currently claim at `priority`.
    ///
    /// The shared pool wins while it has room. Otherwise the bulkheads are scanned
    /// from the (clamped) requested tier down to [`LEVEL_MIN`] and the first tier
    /// with free dedicated capacity answers. Zero means back off.
    pub fn level(&self, priority: usize) -> i64 {
        let global = self.count();
        if global > 0 {
            return global;
        }

        let start = priority.min(self.level_max());
        self.levels[LEVEL_MIN..=start]
            .iter()
            .rev()
            .map(PriorityLevelState::available)
            .find(|available| *available > 0)
            .unwrap_or(0)
    }

    /// Register a task and hand out its process slot.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::AlreadyRegistered`] if the tracker was incremented before
    /// - [`AdmissionError::InvalidPriority`] if its tier does not exist
    pub fn increment(&self, tracker: &TaskTracker) -> Result<ProcessSlot, AdmissionError> {
        if let Some(slot) = tracker.process_slot() {
            error!(task = %tracker.id(), %slot, "task incremented twice");
            return Err(AdmissionError::AlreadyRegistered {
                task: tracker.id(),
                slot,
            });
        }

        let state = self.state_for(tracker)?;
        let slot = ProcessSlot(self.next_slot.fetch_add(1, Ordering::Relaxed));
        if let Err(existing) = tracker.assign_slot(slot) {
            error!(task = %tracker.id(), slot = %existing, "task incremented concurrently");
            return Err(AdmissionError::AlreadyRegistered {
                task: tracker.id(),
                slot: existing,
            });
        }

        self.active.insert(slot, tracker.id());
        state.enter();
        if !tracker.is_internal() {
            self.active_user.fetch_add(1, Ordering::AcqRel);
        }

        debug!(
            task = %tracker.id(),
            %slot,
            level = state.level(),
            internal = tracker.is_internal(),
            "task slot acquired"
        );
        Ok(slot)
    }

    /// Release a task's slot.
    ///
    /// Decrementing a tracker whose slot is no longer registered is a no-op, so a
    /// task reclaimed by a watchdog that later completes is only counted once.
    /// Killed tasks bump the tier's killed counter; unless `force` is set they also
    /// count as having returned.
    ///
    /// # Errors
    ///
    /// [`AdmissionError::MissingSlot`] if the tracker was never incremented.
    pub fn decrement(&self, tracker: &TaskTracker, force: bool) -> Result<(), AdmissionError> {
        let Some(slot) = tracker.process_slot() else {
            error!(task = %tracker.id(), "decrement without an assigned slot");
            return Err(AdmissionError::MissingSlot { task: tracker.id() });
        };

        if self.active.remove(&slot).is_none() {
            debug!(task = %tracker.id(), %slot, "slot already released");
            return Ok(());
        }

        let state = self.state_for(tracker)?;
        state.exit();
        if !tracker.is_internal() {
            self.active_user.fetch_sub(1, Ordering::AcqRel);
        }

        if tracker.is_killed() {
            state.record_killed(!force);
            warn!(
                task = %tracker.id(),
                %slot,
                level = state.level(),
                force,
                "killed task slot reconciled"
            );
        } else {
            debug!(task = %tracker.id(), %slot, level = state.level(), "task slot released");
        }
        Ok(())
    }

    /// Speculatively hold `taken` slots at `priority` under token `id`.
    ///
    /// Returns `false` if the token is already outstanding, the tier is unknown or
    /// `taken` is negative. A rejected call leaves every counter untouched.
    pub fn reservation_make(&self, id: impl Into<String>, priority: usize, taken: i64) -> bool {
        let id = id.into();
        let Some(state) = self.levels.get(priority) else {
            warn!(reservation = %id, priority, "reservation for unknown level");
            return false;
        };
        if taken < 0 {
            warn!(reservation = %id, taken, "negative reservation");
            return false;
        }

        self.reserved_total.fetch_add(taken, Ordering::AcqRel);
        state.add_reserved(taken);

        let inserted = self.reservations.insert(Reservation {
            id: id.clone(),
            priority,
            taken,
            start: Instant::now(),
        });
        if !inserted {
            state.sub_reserved(taken);
            self.reserved_total.fetch_sub(taken, Ordering::AcqRel);
            warn!(reservation = %id, "duplicate reservation token");
            return false;
        }

        debug!(reservation = %id, priority, taken, "reservation made");
        true
    }

    /// Release the reservation under `id`. Unknown tokens return `false`.
    pub fn reservation_release(&self, id: &str) -> bool {
        let Some(reservation) = self.reservations.remove(id) else {
            debug!(reservation = %id, "release of unknown reservation");
            return false;
        };

        if let Some(state) = self.levels.get(reservation.priority) {
            state.sub_reserved(reservation.taken);
        }
        self.reserved_total
            .fetch_sub(reservation.taken, Ordering::AcqRel);

        debug!(
            reservation = %id,
            priority = reservation.priority,
            taken = reservation.taken,
            held_ms = reservation.age().as_millis(),
            "reservation released"
        );
        true
    }

    /// Additional slots a reservation holder could take at `priority` right now:
    /// live headroom minus the tier's outstanding reservations plus its overage,
    /// floored at zero.
    ///
    /// The result is clamped: once `level - reserved + overage` drops below zero,
    /// making or releasing a reservation no longer moves it by the reservation size.
    pub fn reservations_available(&self, priority: usize) -> i64 {
        let state = &self.levels[priority.min(self.level_max())];
        (self.level(priority) - state.reserved() + state.overage()).max(0)
    }

    /// Outstanding reservation count.
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Reservations held for at least `age`.
    pub fn reservations_older_than(&self, age: Duration) -> Vec<ReservationSummary> {
        self.reservations
            .summaries()
            .into_iter()
            .filter(|r| u128::from(r.age_ms) >= age.as_millis())
            .collect()
    }

    /// Release every reservation held for at least `age` and return how many
    /// were released. Only runs when called; nothing sweeps on its own.
    pub fn reservation_sweep(&self, age: Duration) -> usize {
        let stale = self.reservations.older_than(age);
        let released = stale
            .iter()
            .filter(|id| self.reservation_release(id))
            .count();
        if released > 0 {
            warn!(released, max_age_ms = age.as_millis(), "swept stale reservations");
        }
        released
    }

    /// Point-in-time statistics, safe to take under live traffic.
    pub fn stats(&self) -> AvailabilityStats {
        let killed = self.levels.iter().map(PriorityLevelState::killed).sum::<i64>()
            + self.internal.killed();
        let killed_did_return = self
            .levels
            .iter()
            .map(PriorityLevelState::killed_did_return)
            .sum::<i64>()
            + self.internal.killed_did_return();

        AvailabilityStats {
            tasks_max_concurrent: self.max_concurrent,
            slots_available: self.count(),
            active: self.active_count(),
            internal_active: self.internal.active(),
            reserved: self.reserved_total(),
            killed,
            killed_did_return,
            levels: self
                .levels
                .iter()
                .map(PriorityLevelState::debug_string)
                .collect(),
            internal: self.internal.debug_string(),
            reservations: self.reservations.summaries(),
        }
    }

    fn state_for(&self, tracker: &TaskTracker) -> Result<&PriorityLevelState, AdmissionError> {
        match tracker.priority() {
            None => Ok(&self.internal),
            Some(priority) => {
                self.levels
                    .get(priority)
                    .ok_or(AdmissionError::InvalidPriority {
                        priority,
                        max: self.level_max(),
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_levels_raised_to_one() {
        let ta = TaskAvailability::new(0, 4);
        assert_eq!(ta.levels(), 1);
        assert_eq!(ta.level_max(), 0);
    }

    #[test]
    fn test_global_capacity_dominates() {
        let ta = TaskAvailability::new(3, 10);
        assert_eq!(ta.level(0), 10);
        let t = TaskTracker::new(0);
        ta.increment(&t).unwrap();
        assert_eq!(ta.level(2), 9);
        assert_eq!(ta.count(), 9);
    }

    #[test]
    fn test_bulkhead_rejections() {
        let ta = TaskAvailability::new(2, 10);
        assert!(!ta.bulkhead_reserve(0, -1, 0));
        assert!(!ta.bulkhead_reserve(2, 1, 0));
        assert!(ta.bulkhead_reserve(1, 3, 0));
        assert!(ta.bulkhead_reserve(1, 4, 1));
        let state = ta.level_state(1).unwrap();
        assert_eq!(state.bulkhead(), 4);
        assert_eq!(state.overage(), 1);
    }

    #[test]
    fn test_internal_excluded_from_global() {
        let ta = TaskAvailability::new(1, 2);
        let internal = TaskTracker::internal();
        ta.increment(&internal).unwrap();
        assert_eq!(ta.count(), 2);
        assert_eq!(ta.active_count(), 0);
        assert_eq!(ta.internal_state().active(), 1);

        let user = TaskTracker::new(0);
        ta.increment(&user).unwrap();
        assert_eq!(ta.active_count(), 1);
        assert_eq!(ta.count(), 1);

        ta.decrement(&internal, false).unwrap();
        assert_eq!(ta.internal_state().active(), 0);
        assert_eq!(ta.active_count(), 1);
        ta.decrement(&user, false).unwrap();
        assert_eq!(ta.count(), 2);
    }

    #[test]
    fn test_registration_tracks_slot_lifetime() {
        let ta = TaskAvailability::new(1, 4);
        let t = TaskTracker::new(0);
        assert!(!ta.is_registered(&t));
        ta.increment(&t).unwrap();
        assert!(ta.is_registered(&t));
        ta.decrement(&t, false).unwrap();
        assert!(!ta.is_registered(&t));
        // The slot stays stamped on the tracker after release.
        assert!(t.process_slot().is_some());
    }

    #[test]
    fn test_invalid_priority_leaves_tracker_unassigned() {
        let ta = TaskAvailability::new(2, 2);
        let t = TaskTracker::new(5);
        assert_eq!(
            ta.increment(&t),
            Err(AdmissionError::InvalidPriority { priority: 5, max: 1 })
        );
        assert!(t.process_slot().is_none());
    }

    #[test]
    fn test_missing_slot_decrement() {
        let ta = TaskAvailability::new(1, 1);
        let t = TaskTracker::new(0);
        assert_eq!(
            ta.decrement(&t, false),
            Err(AdmissionError::MissingSlot { task: t.id() })
        );
    }

    #[test]
    fn test_failed_reservation_rolls_back() {
        let ta = TaskAvailability::new(1, 10);
        assert!(ta.reservation_make("x", 0, 2));
        assert!(!ta.reservation_make("x", 0, 5));
        assert_eq!(ta.reserved_total(), 2);
        assert_eq!(ta.level_state(0).unwrap().reserved(), 2);
        assert!(!ta.reservation_make("y", 3, 1));
        assert!(!ta.reservation_make("z", 0, -1));
        assert_eq!(ta.reserved_total(), 2);
    }

    #[test]
    fn test_sweep_is_opt_in() {
        let ta = TaskAvailability::new(1, 10);
        assert!(ta.reservation_make("r", 0, 4));
        assert_eq!(ta.reservation_sweep(Duration::from_secs(3600)), 0);
        assert_eq!(ta.reservation_count(), 1);
        assert_eq!(ta.reservation_sweep(Duration::ZERO), 1);
        assert_eq!(ta.reservation_count(), 0);
        assert_eq!(ta.reserved_total(), 0);
    }
}
