//! Termination signal.
//!
//! A [`Termination`] is the fatal cancellation outcome of a unit that crossed
//! one of its budgets. It cannot be constructed outside this crate, so a unit
//! cannot forge or replay one.
//!
//! Two delivery paths exist:
//!
//! - [`raise`] unwinds the whole worker stack with `resume_unwind` (no panic
//!   hook, no message on stderr). The outer dispatch loop of the sandbox host
//!   is the only place that inspects the payload.
//! - [`Fault`] carries the same value as an explicit result for engines that
//!   drive units through a dispatch loop instead of native frames. A unit's
//!   own handlers may intercept [`Fault::Raised`] but never
//!   [`Fault::Terminated`].
//!
//! Catching the unwind inside the unit does not help it: the ledger stays
//! dead and every later accounting call re-raises the same termination.

use crate::config::types::CostLane;
use serde::Serialize;
use std::any::Any;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[must_use = "a termination must be propagated to the outer dispatch loop"]
pub struct Termination {
    lane: CostLane,
    total: u64,
    limit: u64,
}

impl Termination {
    pub(crate) const fn new(lane: CostLane, total: u64, limit: u64) -> Self {
        Self { lane, total, limit }
    }

    /// Lane whose counter crossed its limit
    pub const fn lane(&self) -> CostLane {
        self.lane
    }

    /// Counter value after the fatal increment
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Limit in force when the unit was terminated
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Recover a termination from an unwind payload (`JoinHandle::join`,
    /// `catch_unwind`). Returns `None` for ordinary panics.
    pub fn from_payload(payload: &(dyn Any + Send)) -> Option<Self> {
        payload.downcast_ref::<Termination>().copied()
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unit terminated for {}: {} cost {} exceeds limit {}",
            self.lane.violation_reason(),
            self.lane,
            self.total,
            self.limit
        )
    }
}

/// Unwind the current thread with `termination` as payload. Never returns.
pub fn raise(termination: Termination) -> ! {
    std::panic::resume_unwind(Box::new(termination))
}

/// Outcome of a fallible step inside an execution unit.
#[derive(Debug, PartialEq)]
pub enum Fault<E> {
    /// Error raised by the unit itself; interceptable by the unit
    Raised(E),
    /// Budget termination; only the host may observe it
    Terminated(Termination),
}

impl<E> Fault<E> {
    /// Run the unit's handler for [`Fault::Raised`]. A termination bypasses
    /// the handler and is returned unchanged.
    ///
    /// ```
    /// use costbox::core::termination::Fault;
    ///
    /// let raised: Result<u32, Fault<&str>> = Err(Fault::Raised("boom"));
    /// let handled = raised.or_else(|fault| fault.recover(|_| Ok(0)));
    /// assert_eq!(handled, Ok(0));
    /// ```
    pub fn recover<T>(self, handler: impl FnOnce(E) -> Result<T, Fault<E>>) -> Result<T, Fault<E>> {
        match self {
            Fault::Raised(error) => handler(error),
            Fault::Terminated(termination) => Err(Fault::Terminated(termination)),
        }
    }

    pub fn termination(&self) -> Option<Termination> {
        match self {
            Fault::Raised(_) => None,
            Fault::Terminated(termination) => Some(*termination),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::Terminated(_))
    }
}

impl<E> From<Termination> for Fault<E> {
    fn from(termination: Termination) -> Self {
        Fault::Terminated(termination)
    }
}
