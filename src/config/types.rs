/// Core types and structures for the costbox accountant
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Baseline allocation budget (abstract units, not bytes)
pub const BASELINE_ALLOCATION_LIMIT: u64 = 1024 * 1024;
/// Baseline control-transfer budget
pub const BASELINE_JUMP_LIMIT: u64 = 100;
/// Baseline invocation budget
pub const BASELINE_INVOCATION_LIMIT: u64 = 100;
/// Baseline throw budget
pub const BASELINE_THROW_LIMIT: u64 = 50;

/// Independently budgeted resource dimension.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CostLane {
    /// Object and array construction
    #[serde(rename = "allocation")]
    Allocation,
    /// Control transfers and loop-back edges
    #[serde(rename = "jump")]
    Jump,
    /// Method/function invocations
    #[serde(rename = "invocation")]
    Invocation,
    /// Exception/error raises
    #[serde(rename = "throw")]
    Throw,
}

impl CostLane {
    pub const ALL: [CostLane; 4] = [
        CostLane::Allocation,
        CostLane::Jump,
        CostLane::Invocation,
        CostLane::Throw,
    ];

    /// Slot of this lane inside a ledger.
    pub const fn index(self) -> usize {
        match self {
            CostLane::Allocation => 0,
            CostLane::Jump => 1,
            CostLane::Invocation => 2,
            CostLane::Throw => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            CostLane::Allocation => "allocation",
            CostLane::Jump => "jump",
            CostLane::Invocation => "invocation",
            CostLane::Throw => "throw",
        }
    }

    /// Human-readable reason used when a unit is terminated on this lane.
    pub const fn violation_reason(self) -> &'static str {
        match self {
            CostLane::Allocation => "overallocation",
            CostLane::Jump => "excessive use of looping",
            CostLane::Invocation => "excessive method calling",
            CostLane::Throw => "excessive exception throwing",
        }
    }
}

impl fmt::Display for CostLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostLane {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allocation" | "alloc" => Ok(CostLane::Allocation),
            "jump" => Ok(CostLane::Jump),
            "invocation" | "invoke" | "call" => Ok(CostLane::Invocation),
            "throw" => Ok(CostLane::Throw),
            other => Err(AccountingError::Config(format!("unknown cost lane: {}", other))),
        }
    }
}

/// Per-lane kill thresholds.
///
/// A ledger at exactly the limit is still allowed to continue; the next unit
/// of cost is the one that terminates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostLimits {
    pub allocation: u64,
    pub jump: u64,
    pub invocation: u64,
    pub throw: u64,
}

impl Default for CostLimits {
    fn default() -> Self {
        Self {
            allocation: BASELINE_ALLOCATION_LIMIT,
            jump: BASELINE_JUMP_LIMIT,
            invocation: BASELINE_INVOCATION_LIMIT,
            throw: BASELINE_THROW_LIMIT,
        }
    }
}

impl CostLimits {
    pub const fn limit(&self, lane: CostLane) -> u64 {
        match lane {
            CostLane::Allocation => self.allocation,
            CostLane::Jump => self.jump,
            CostLane::Invocation => self.invocation,
            CostLane::Throw => self.throw,
        }
    }

    pub fn set_limit(&mut self, lane: CostLane, value: u64) {
        match lane {
            CostLane::Allocation => self.allocation = value,
            CostLane::Jump => self.jump = value,
            CostLane::Invocation => self.invocation = value,
            CostLane::Throw => self.throw = value,
        }
    }

    pub fn with_limit(mut self, lane: CostLane, value: u64) -> Self {
        self.set_limit(lane, value);
        self
    }

    /// Compute SHA256 fingerprint of the canonical limit set
    pub fn envelope_id(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Optional per-lane overrides layered on top of a preset.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitOverrides {
    #[serde(default)]
    pub allocation: Option<u64>,
    #[serde(default)]
    pub jump: Option<u64>,
    #[serde(default)]
    pub invocation: Option<u64>,
    #[serde(default)]
    pub throw: Option<u64>,
}

impl LimitOverrides {
    pub const fn get(&self, lane: CostLane) -> Option<u64> {
        match lane {
            CostLane::Allocation => self.allocation,
            CostLane::Jump => self.jump,
            CostLane::Invocation => self.invocation,
            CostLane::Throw => self.throw,
        }
    }

    pub fn set(&mut self, lane: CostLane, value: Option<u64>) {
        match lane {
            CostLane::Allocation => self.allocation = value,
            CostLane::Jump => self.jump = value,
            CostLane::Invocation => self.invocation = value,
            CostLane::Throw => self.throw = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        CostLane::ALL.iter().all(|lane| self.get(*lane).is_none())
    }

    /// Overlay these overrides on `base`.
    pub fn apply(&self, base: CostLimits) -> CostLimits {
        CostLane::ALL.iter().fold(base, |limits, lane| match self.get(*lane) {
            Some(value) => limits.with_limit(*lane, value),
            None => limits,
        })
    }
}

/// Threshold policy outcome for a single check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Terminate,
}

/// Point-in-time copy of a four-lane ledger.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub allocation: u64,
    pub jump: u64,
    pub invocation: u64,
    pub throw: u64,
}

impl LedgerSnapshot {
    pub const fn from_counts(counts: [u64; 4]) -> Self {
        Self {
            allocation: counts[0],
            jump: counts[1],
            invocation: counts[2],
            throw: counts[3],
        }
    }

    pub const fn get(&self, lane: CostLane) -> u64 {
        match lane {
            CostLane::Allocation => self.allocation,
            CostLane::Jump => self.jump,
            CostLane::Invocation => self.invocation,
            CostLane::Throw => self.throw,
        }
    }

    pub fn is_zero(&self) -> bool {
        CostLane::ALL.iter().all(|lane| self.get(*lane) == 0)
    }

    /// First lane (in ledger order) whose count exceeds its limit.
    pub fn first_exceeded(&self, limits: &CostLimits) -> Option<CostLane> {
        CostLane::ALL
            .iter()
            .copied()
            .find(|lane| self.get(*lane) > limits.limit(*lane))
    }
}

/// Status of a finished execution unit - closed taxonomy
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnitStatus {
    /// Unit returned normally within every budget
    #[serde(rename = "OK")]
    Ok,
    /// Budget limit exceeded; unit was terminated by the accountant
    #[serde(rename = "BLE")]
    BudgetExceeded,
    /// Unit panicked on its own (not a budget termination)
    #[serde(rename = "RE")]
    RuntimeError,
    /// Evidence is inconsistent (host or instrumentation failure)
    #[serde(rename = "IE")]
    InternalError,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Ok => write!(f, "OK"),
            UnitStatus::BudgetExceeded => write!(f, "BLE"),
            UnitStatus::RuntimeError => write!(f, "RE"),
            UnitStatus::InternalError => write!(f, "IE"),
        }
    }
}

/// Verdict actor - who ended the unit
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerdictActor {
    /// Cost accountant raised the termination signal
    #[serde(rename = "accountant")]
    Accountant,
    /// Unit's own behaviour
    #[serde(rename = "runtime")]
    Runtime,
    /// Sandbox host
    #[serde(rename = "host")]
    Host,
}

/// Verdict cause - specific reason for the verdict
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerdictCause {
    // BLE causes
    #[serde(rename = "ble_allocation")]
    BleAllocation,
    #[serde(rename = "ble_jump")]
    BleJump,
    #[serde(rename = "ble_invocation")]
    BleInvocation,
    #[serde(rename = "ble_throw")]
    BleThrow,

    // RE causes
    #[serde(rename = "re_unit_panic")]
    ReUnitPanic,

    // IE causes
    #[serde(rename = "ie_contradictory_evidence")]
    IeContradictoryEvidence,

    // Other
    #[serde(rename = "normal_completion")]
    NormalCompletion,
}

impl VerdictCause {
    pub const fn for_lane(lane: CostLane) -> Self {
        match lane {
            CostLane::Allocation => VerdictCause::BleAllocation,
            CostLane::Jump => VerdictCause::BleJump,
            CostLane::Invocation => VerdictCause::BleInvocation,
            CostLane::Throw => VerdictCause::BleThrow,
        }
    }
}

/// Complete provenance for a unit verdict
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerdictProvenance {
    /// Who ended the unit
    pub verdict_actor: VerdictActor,
    /// Specific reason for verdict
    pub verdict_cause: VerdictCause,
    /// Evidence sources used
    pub verdict_evidence_sources: Vec<String>,
    /// Lane that crossed its limit (if any)
    pub triggering_lane: Option<CostLane>,
    /// Final ledger of the unit
    pub ledger: LedgerSnapshot,
    /// Limit snapshot at execution time
    pub limit_snapshot: CostLimits,
    /// Fingerprint of `limit_snapshot`
    pub envelope_id: String,
    /// Wall time used (milliseconds)
    pub wall_time_ms: u64,
    /// Free-form detail (panic message, inconsistency description)
    pub detail: Option<String>,
}

/// Custom error types for costbox
#[derive(Error, Debug)]
pub enum AccountingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown budget preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid array allocation: length={length}, element_size={element_size}")]
    InvalidAllocation { length: i64, element_size: i64 },

    #[error("Sandbox host is shut down")]
    HostShutdown,

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

/// Result type alias for costbox operations
pub type Result<T> = std::result::Result<T, AccountingError>;
