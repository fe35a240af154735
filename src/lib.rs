//! costbox: per-thread cost accounting for sandboxed execution units
//! Meters allocation, jump, invocation, and throw events of untrusted code and
//! terminates a unit the moment one of its budgets is exceeded
//!
//! # Architecture
//!
//! ## Accounting Core ([`core`])
//! - [`core::ledger`]: Thread-local four-lane counter store
//! - [`core::policy`]: Strict greater-than threshold decision
//! - [`core::termination`]: Uncatchable termination signal and `Fault` results
//! - [`core::supervisor`]: Exempt supervisor thread identity
//! - [`core::accountant`]: Public `record_*` accounting API
//! - [`core::host`]: Worker pool, dedicated threads, and the reset protocol
//!
//! ## Evidence & Verdict ([`verdict`])
//! - [`verdict::verdict`]: Unit verdict classification with provenance
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//! - [`observability::metrics`]: Prometheus metrics export
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Lanes, limits, closed status enums, errors
//! - [`config::presets`]: Versioned budget envelopes
//! - [`config::loader`]: JSON budget files
//! - [`config::validator`]: Startup validation of limits
//!
//! # Design Principles
//!
//! 1. **Thread-confined counters** - A ledger is touched only by its owning thread
//! 2. **Kill on the crossing increment** - Total strictly above the limit terminates
//! 3. **Termination is not an error** - Unit code can neither forge nor absorb it
//! 4. **Explicit supervisor** - The exempt thread is injected, never ambient

// Accounting Core
pub mod core;

// Evidence & Verdict
pub mod verdict;

// Observability
pub mod observability;

// Configuration
pub mod config;

// CLI entrypoint wiring for the costbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;

pub use crate::core::accountant::{
    get_allocation_cost, get_invoke_cost, get_jump_cost, get_throw_cost, record_allocation,
    record_array_allocation, record_jump, record_method_call, record_throw, reset_counters,
    CostAccountant,
};
pub use crate::core::host::{HostConfig, SandboxHost, UnitHandle};
pub use crate::core::supervisor::ThreadKey;
pub use crate::core::termination::{Fault, Termination};
pub use crate::core::types::{UnitOutcome, UnitReport};
pub use crate::verdict::VerdictClassifier;
