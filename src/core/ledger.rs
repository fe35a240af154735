//! Counter store.
//!
//! Every worker thread owns exactly one [`CostLedger`] in thread-local
//! storage. No other thread can reach it, so increments are plain
//! read-modify-write with no lock, atomic, or barrier.
//!
//! The ledger is also the per-unit arena: [`begin_unit`] zeroes it and tags it
//! with the unit id before a pooled thread starts a new unit, so cost never
//! leaks between unrelated units sharing a thread.

use crate::config::types::{CostLane, LedgerSnapshot};
use crate::core::termination::Termination;
use std::cell::Cell;
use uuid::Uuid;

/// Four-lane counter set of a single execution unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CostLedger {
    counts: [u64; 4],
    violation: Option<Termination>,
    unit: Option<Uuid>,
}

impl CostLedger {
    pub const fn new() -> Self {
        Self {
            counts: [0; 4],
            violation: None,
            unit: None,
        }
    }

    /// Add `amount` to `lane` and return the new total. Saturates at `u64::MAX`.
    pub fn increment(&mut self, lane: CostLane, amount: u64) -> u64 {
        let slot = &mut self.counts[lane.index()];
        *slot = slot.saturating_add(amount);
        *slot
    }

    pub const fn get(&self, lane: CostLane) -> u64 {
        self.counts[lane.index()]
    }

    /// Zero all lanes of a live ledger. A dead ledger keeps its counts and
    /// violation; only the host clears it between units.
    pub fn reset(&mut self) {
        if self.violation.is_none() {
            self.counts = [0; 4];
        }
    }

    pub const fn violation(&self) -> Option<Termination> {
        self.violation
    }

    pub const fn is_terminated(&self) -> bool {
        self.violation.is_some()
    }

    pub(crate) fn mark_terminated(&mut self, termination: Termination) {
        self.violation = Some(termination);
    }

    pub const fn unit(&self) -> Option<Uuid> {
        self.unit
    }

    pub const fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::from_counts(self.counts)
    }
}

thread_local! {
    static LEDGER: Cell<CostLedger> = const { Cell::new(CostLedger::new()) };
}

/// Run `f` against the calling thread's ledger and store the result back.
pub fn with_current<R>(f: impl FnOnce(&mut CostLedger) -> R) -> R {
    LEDGER.with(|cell| {
        let mut ledger = cell.get();
        let out = f(&mut ledger);
        cell.set(ledger);
        out
    })
}

/// Copy of the calling thread's ledger.
pub fn current() -> CostLedger {
    LEDGER.with(Cell::get)
}

pub fn increment(lane: CostLane, amount: u64) -> u64 {
    with_current(|ledger| ledger.increment(lane, amount))
}

pub fn get(lane: CostLane) -> u64 {
    current().get(lane)
}

pub fn snapshot() -> LedgerSnapshot {
    current().snapshot()
}

pub fn violation() -> Option<Termination> {
    current().violation()
}

/// Zero the calling thread's ledger only. No effect once it is dead.
pub fn reset() {
    with_current(CostLedger::reset);
}

/// Drop the calling thread's ledger entirely, violation and unit tag included.
pub(crate) fn clear() {
    LEDGER.with(|cell| cell.set(CostLedger::new()));
}

/// Reset protocol for pooled threads: fresh ledger tagged with `unit`.
pub fn begin_unit(unit: Uuid) {
    let mut ledger = CostLedger::new();
    ledger.unit = Some(unit);
    LEDGER.with(|cell| cell.set(ledger));
}

/// Id of the unit the calling thread is currently charging, if tagged.
pub fn current_unit() -> Option<Uuid> {
    current().unit()
}
