//! Configuration and policy
//!
//! Budget definition, presets, loading, and validation.

pub mod loader;
pub mod presets;
pub mod types;
pub mod validator;
