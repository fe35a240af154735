//! Evidence produced by the sandbox host for each execution unit.

use crate::config::types::{CostLimits, LedgerSnapshot};
use crate::core::termination::Termination;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// How an execution unit ended
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum UnitOutcome<T> {
    /// Unit returned normally with a live ledger
    #[serde(rename = "completed")]
    Completed(T),
    /// Budget termination; any value the unit produced is discarded
    #[serde(rename = "terminated")]
    Terminated(Termination),
    /// Unit panicked for a reason unrelated to accounting
    #[serde(rename = "panicked")]
    Panicked(String),
}

impl<T> UnitOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, UnitOutcome::Completed(_))
    }

    pub fn termination(&self) -> Option<Termination> {
        match self {
            UnitOutcome::Terminated(termination) => Some(*termination),
            _ => None,
        }
    }
}

/// Per-unit report returned to the supervisor
#[derive(Clone, Debug, Serialize)]
pub struct UnitReport<T> {
    pub unit_id: Uuid,
    /// Name of the thread that ran the unit
    pub worker: String,
    pub outcome: UnitOutcome<T>,
    /// Ledger as the unit left it
    pub ledger: LedgerSnapshot,
    pub limits: CostLimits,
    pub envelope_id: String,
    pub started_at: DateTime<Utc>,
    pub wall_time_ms: u64,
}

impl<T> UnitReport<T> {
    pub fn is_terminated(&self) -> bool {
        self.outcome.termination().is_some()
    }
}
