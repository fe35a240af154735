//! Public accounting API.
//!
//! Instrumented unit code calls one `record_*` operation per costed
//! operation. Each call follows the same protocol:
//!
//! 1. the supervisor thread returns immediately, untouched;
//! 2. the calling thread's ledger is charged (1 unit, or
//!    `length * element_size` for arrays);
//! 3. the threshold policy decides; on `Terminate` the call raises the
//!    termination signal and never returns.
//!
//! A [`CostAccountant`] carries the policy and supervisor identity for one
//! sandbox host. Worker threads bind it with
//! [`CostAccountant::bind_current_thread`] so instrumented code can use the
//! free functions ([`record_jump`] etc.). Threads with no binding charge a
//! process-wide accountant that has baseline limits and no exempt thread.

use crate::config::types::{AccountingError, CostLane, CostLimits, Decision, LedgerSnapshot, Result};
use crate::core::ledger;
use crate::core::policy::ThresholdPolicy;
use crate::core::supervisor::{SupervisorRegistry, ThreadKey};
use crate::core::termination::{raise, Termination};
use crate::observability::{audit, metrics};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::sync::Arc;

static DEFAULT_ACCOUNTANT: Lazy<Arc<CostAccountant>> =
    Lazy::new(|| Arc::new(CostAccountant::new(CostLimits::default())));

thread_local! {
    static BOUND: RefCell<Option<Arc<CostAccountant>>> = const { RefCell::new(None) };
}

enum Charge {
    Accepted,
    Violated(Termination),
    AlreadyDead(Termination),
}

#[derive(Debug)]
pub struct CostAccountant {
    policy: ThresholdPolicy,
    supervisor: SupervisorRegistry,
    envelope_id: String,
}

impl CostAccountant {
    /// Accountant with no exempt thread
    pub fn new(limits: CostLimits) -> Self {
        Self {
            policy: ThresholdPolicy::new(limits),
            supervisor: SupervisorRegistry::new(),
            envelope_id: limits.envelope_id(),
        }
    }

    /// Accountant whose `supervisor` thread is never metered
    pub fn with_supervisor(limits: CostLimits, supervisor: ThreadKey) -> Self {
        let accountant = Self::new(limits);
        accountant.set_supervisor(supervisor);
        accountant
    }

    pub fn limits(&self) -> &CostLimits {
        self.policy.limits()
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// SHA256 fingerprint of the enforced limits
    pub fn envelope_id(&self) -> &str {
        &self.envelope_id
    }

    pub fn set_supervisor(&self, key: ThreadKey) {
        self.supervisor.set_supervisor(key);
        audit::events::supervisor_registered(key);
    }

    pub fn supervisor(&self) -> Option<ThreadKey> {
        self.supervisor.supervisor()
    }

    pub fn is_supervisor(&self, key: ThreadKey) -> bool {
        self.supervisor.is_supervisor(key)
    }

    pub fn record_jump(&self) {
        log::trace!("record_jump on {}", thread_label());
        self.charge(CostLane::Jump, 1);
    }

    pub fn record_method_call(&self) {
        log::trace!("record_method_call on {}", thread_label());
        self.charge(CostLane::Invocation, 1);
    }

    pub fn record_throw(&self) {
        log::trace!("record_throw on {}", thread_label());
        self.charge(CostLane::Throw, 1);
    }

    /// Scalar allocation: one unit regardless of the type's real size.
    pub fn record_allocation(&self, type_name: &str) {
        log::trace!("record_allocation of {} on {}", type_name, thread_label());
        self.charge(CostLane::Allocation, 1);
    }

    /// Array allocation: `length * element_size` units. The product of two
    /// `u32` always fits in `u64`.
    pub fn record_array_allocation(&self, length: u32, element_size: u32) {
        log::trace!(
            "record_array_allocation length={} element_size={} on {}",
            length,
            element_size,
            thread_label()
        );
        self.charge(CostLane::Allocation, u64::from(length) * u64::from(element_size));
    }

    /// Charge `amount` to `lane` without unwinding. The returned termination
    /// must be propagated by the caller's dispatch loop.
    pub fn try_record(&self, lane: CostLane, amount: u64) -> std::result::Result<(), Termination> {
        if self.supervisor.is_current_supervisor() {
            return Ok(());
        }

        let charge = ledger::with_current(|ledger| {
            if let Some(termination) = ledger.violation() {
                return Charge::AlreadyDead(termination);
            }
            let total = ledger.increment(lane, amount);
            match self.policy.check_after_increment(lane, total) {
                Decision::Continue => Charge::Accepted,
                Decision::Terminate => {
                    let termination = Termination::new(lane, total, self.policy.limit(lane));
                    ledger.mark_terminated(termination);
                    Charge::Violated(termination)
                }
            }
        });

        match charge {
            Charge::Accepted => Ok(()),
            Charge::AlreadyDead(termination) => Err(termination),
            Charge::Violated(termination) => {
                self.report_violation(&termination);
                Err(termination)
            }
        }
    }

    fn charge(&self, lane: CostLane, amount: u64) {
        if let Err(termination) = self.try_record(lane, amount) {
            raise(termination);
        }
    }

    fn report_violation(&self, termination: &Termination) {
        let thread = thread_label();
        log::debug!(
            "Contract {} terminated for {} ({} {} > {})",
            thread,
            termination.lane().violation_reason(),
            termination.lane(),
            termination.total(),
            termination.limit()
        );
        metrics::global().record_termination(termination.lane());
        audit::events::budget_violation(termination, ledger::current_unit(), &thread, ledger::snapshot());
    }

    pub fn get_allocation_cost(&self) -> u64 {
        ledger::get(CostLane::Allocation)
    }

    pub fn get_jump_cost(&self) -> u64 {
        ledger::get(CostLane::Jump)
    }

    pub fn get_invoke_cost(&self) -> u64 {
        ledger::get(CostLane::Invocation)
    }

    pub fn get_throw_cost(&self) -> u64 {
        ledger::get(CostLane::Throw)
    }

    pub fn get_cost(&self, lane: CostLane) -> u64 {
        ledger::get(lane)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        ledger::snapshot()
    }

    /// Zero the calling thread's ledger. Other threads are unaffected, and a
    /// terminated ledger stays terminated.
    pub fn reset_counters(&self) {
        ledger::reset();
    }

    /// Route the free accounting functions on this thread to `self`.
    /// Returns the binding it replaced.
    pub fn bind_current_thread(self: &Arc<Self>) -> Option<Arc<CostAccountant>> {
        let accountant = Arc::clone(self);
        BOUND.with(|bound| bound.borrow_mut().replace(accountant))
    }

    /// Undo [`bind_current_thread`](Self::bind_current_thread) if this thread
    /// is still bound to `self`, reinstating `previous`.
    pub fn release_current_thread(self: &Arc<Self>, previous: Option<Arc<CostAccountant>>) {
        BOUND.with(|bound| {
            let mut bound = bound.borrow_mut();
            if bound.as_ref().is_some_and(|current| Arc::ptr_eq(current, self)) {
                *bound = previous;
            }
        });
    }

    pub fn unbind_current_thread() {
        BOUND.with(|bound| *bound.borrow_mut() = None);
    }
}

fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("thread-{}", ThreadKey::current().get()),
    }
}

/// Run `f` with the accountant bound to this thread (or the process default).
/// `f` must not rebind the calling thread.
pub fn with_bound<R>(f: impl FnOnce(&CostAccountant) -> R) -> R {
    BOUND.with(|bound| match bound.borrow().as_deref() {
        Some(accountant) => f(accountant),
        None => f(&DEFAULT_ACCOUNTANT),
    })
}

pub fn record_jump() {
    with_bound(CostAccountant::record_jump)
}

pub fn record_method_call() {
    with_bound(CostAccountant::record_method_call)
}

pub fn record_throw() {
    with_bound(CostAccountant::record_throw)
}

pub fn record_allocation(type_name: &str) {
    with_bound(|accountant| accountant.record_allocation(type_name))
}

pub fn record_array_allocation(length: u32, element_size: u32) {
    with_bound(|accountant| accountant.record_array_allocation(length, element_size))
}

pub fn get_allocation_cost() -> u64 {
    ledger::get(CostLane::Allocation)
}

pub fn get_jump_cost() -> u64 {
    ledger::get(CostLane::Jump)
}

pub fn get_invoke_cost() -> u64 {
    ledger::get(CostLane::Invocation)
}

pub fn get_throw_cost() -> u64 {
    ledger::get(CostLane::Throw)
}

/// Zero the calling thread's ledger unless it is already terminated.
pub fn reset_counters() {
    ledger::reset();
}

/// Allocation cost for front-ends that carry signed lengths.
/// Negative inputs are rejected; oversize products saturate (and therefore
/// always exceed the allocation limit).
pub fn array_cost(length: i64, element_size: i64) -> Result<u64> {
    if length < 0 || element_size < 0 {
        return Err(AccountingError::InvalidAllocation {
            length,
            element_size,
        });
    }
    Ok((length as u64).saturating_mul(element_size as u64))
}
