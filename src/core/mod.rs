//! Cost accounting core.
//!
//! Core owns the per-thread ledgers, the threshold decision, the
//! termination signal, and the host that runs units on metered threads.
//! Configuration and verdict derivation live outside it.

pub mod accountant;
pub mod host;
pub mod ledger;
pub mod policy;
pub mod supervisor;
pub mod termination;
pub mod types;
