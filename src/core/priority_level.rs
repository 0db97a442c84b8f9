//! Per-tier counters.

use std::sync::atomic::{AtomicI64, Ordering};

/// Counters for one priority tier.
///
/// Holds no policy of its own. The controller keeps one instance per tier plus one
/// for internal work.
#[derive(Debug)]
pub struct PriorityLevelState {
    level: usize,
    bulkhead: AtomicI64,
    overage: AtomicI64,
    active: AtomicI64,
    reserved: AtomicI64,
    killed: AtomicI64,
    killed_did_return: AtomicI64,
    hits: AtomicI64,
}

impl PriorityLevelState {
    /// Fresh tier with no bulkhead.
    pub const fn new(level: usize) -> Self {
        Self {
            level,
            bulkhead: AtomicI64::new(0),
            overage: AtomicI64::new(0),
            active: AtomicI64::new(0),
            reserved: AtomicI64::new(0),
            killed: AtomicI64::new(0),
            killed_did_return: AtomicI64::new(0),
            hits: AtomicI64::new(0),
        }
    }

    /// Tier index.
    pub const fn level(&self) -> usize {
        self.level
    }

    /// Dedicated minimum capacity.
    pub fn bulkhead(&self) -> i64 {
        self.bulkhead.load(Ordering::Acquire)
    }

    /// Burst allowance granted to reservation holders.
    pub fn overage(&self) -> i64 {
        self.overage.load(Ordering::Acquire)
    }

    /// In-flight tasks.
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Acquire)
    }

    /// Slots held by outstanding reservations.
    pub fn reserved(&self) -> i64 {
        self.reserved.load(Ordering::Acquire)
    }

    /// Tasks reclaimed by a watchdog.
    pub fn killed(&self) -> i64 {
        self.killed.load(Ordering::Relaxed)
    }

    /// Reclaimed tasks that still reported completion later.
    pub fn killed_did_return(&self) -> i64 {
        self.killed_did_return.load(Ordering::Relaxed)
    }

    /// Lifetime increments.
    pub fn hits(&self) -> i64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Free bulkhead slots: `max(bulkhead - active, 0)`.
    pub fn available(&self) -> i64 {
        (self.bulkhead() - self.active()).max(0)
    }

    pub(crate) fn configure(&self, bulkhead: i64, overage: i64) {
        self.bulkhead.store(bulkhead, Ordering::Release);
        self.overage.store(overage, Ordering::Release);
    }

    pub(crate) fn enter(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one active task, never going below zero.
    pub(crate) fn exit(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current > 0).then(|| current - 1)
            });
    }

    pub(crate) fn record_killed(&self, did_return: bool) {
        self.killed.fetch_add(1, Ordering::Relaxed);
        if did_return {
            self.killed_did_return.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn add_reserved(&self, taken: i64) {
        self.reserved.fetch_add(taken, Ordering::AcqRel);
    }

    pub(crate) fn sub_reserved(&self, taken: i64) {
        self.reserved.fetch_sub(taken, Ordering::AcqRel);
    }

    /// One-line summary for the statistics snapshot.
    pub fn debug_string(&self) -> String {
        format!(
            "level={} bulkhead={} overage={} active={} available={} reserved={} killed={} killed_did_return={} hits={}",
            self.level,
            self.bulkhead(),
            self.overage(),
            self.active(),
            self.available(),
            self.reserved(),
            self.killed(),
            self.killed_did_return(),
            self.hits(),
        )
    }
}
