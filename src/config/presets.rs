/// Budget Envelopes
///
/// Named, versioned limit sets so different sandboxes can run with different
/// budgets without touching accounting logic. Each envelope is immutable once
/// registered; explicit per-lane overrides win over the envelope.
use crate::config::types::{AccountingError, CostLane, CostLimits, LimitOverrides, Result};
use std::collections::HashMap;

/// Identifier of the envelope used when nothing else is configured.
pub const DEFAULT_PRESET: &str = "baseline-v1";

/// Budget envelope
#[derive(Debug, Clone)]
pub struct BudgetEnvelope {
    /// Envelope ID (e.g., "baseline-v1", "strict-v1")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Version of this envelope
    pub version: String,
    /// Per-lane kill thresholds
    pub limits: CostLimits,
    /// Intended workload
    pub description: String,
}

impl BudgetEnvelope {
    /// Resolve the envelope against explicit overrides.
    /// Lanes without an override keep the envelope value.
    pub fn apply_overrides(&self, overrides: &LimitOverrides) -> CostLimits {
        let limits = overrides.apply(self.limits);
        for lane in CostLane::ALL {
            if let Some(value) = overrides.get(lane) {
                log::debug!(
                    "Envelope {}: {} limit overridden {} -> {}",
                    self.id,
                    lane,
                    self.limits.limit(lane),
                    value
                );
            }
        }
        log::info!("Applied budget envelope: {} ({})", self.id, self.name);
        limits
    }
}

/// Budget preset registry
pub struct BudgetPresets {
    envelopes: HashMap<String, BudgetEnvelope>,
}

impl BudgetPresets {
    /// Create new preset registry with default envelopes
    pub fn new() -> Self {
        let mut presets = Self {
            envelopes: HashMap::new(),
        };

        presets.register_baseline_v1();
        presets.register_strict_v1();
        presets.register_batch_v1();

        presets
    }

    fn register_baseline_v1(&mut self) {
        self.register(BudgetEnvelope {
            id: DEFAULT_PRESET.to_string(),
            name: "Baseline contract budget".to_string(),
            version: "1.0.0".to_string(),
            limits: CostLimits::default(),
            description: "Default budget for short verification units".to_string(),
        });
    }

    fn register_strict_v1(&mut self) {
        self.register(BudgetEnvelope {
            id: "strict-v1".to_string(),
            name: "Strict contract budget".to_string(),
            version: "1.0.0".to_string(),
            limits: CostLimits {
                allocation: 64 * 1024,
                jump: 50,
                invocation: 50,
                throw: 10,
            },
            description: "Tight budget for untrusted units from unknown origins".to_string(),
        });
    }

    fn register_batch_v1(&mut self) {
        self.register(BudgetEnvelope {
            id: "batch-v1".to_string(),
            name: "Batch contract budget".to_string(),
            version: "1.0.0".to_string(),
            limits: CostLimits {
                allocation: 16 * 1024 * 1024,
                jump: 10_000,
                invocation: 10_000,
                throw: 500,
            },
            description: "Generous budget for vetted batch workloads".to_string(),
        });
    }

    /// Register (or replace) an envelope
    pub fn register(&mut self, envelope: BudgetEnvelope) {
        self.envelopes.insert(envelope.id.clone(), envelope);
    }

    pub fn get(&self, id: &str) -> Option<&BudgetEnvelope> {
        self.envelopes.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&BudgetEnvelope> {
        self.get(id)
            .ok_or_else(|| AccountingError::UnknownPreset(id.to_string()))
    }

    /// Envelope IDs in stable order
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.envelopes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for BudgetPresets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_all_envelopes() {
        let presets = BudgetPresets::new();
        assert_eq!(presets.list(), vec!["baseline-v1", "batch-v1", "strict-v1"]);
    }

    #[test]
    fn baseline_envelope_uses_baseline_limits() {
        let presets = BudgetPresets::new();
        let baseline = presets.require(DEFAULT_PRESET).unwrap();
        assert_eq!(baseline.limits, CostLimits::default());
    }

    #[test]
    fn unknown_preset_is_reported_by_name() {
        let presets = BudgetPresets::new();
        match presets.require("turbo-v9") {
            Err(AccountingError::UnknownPreset(name)) => assert_eq!(name, "turbo-v9"),
            other => panic!("unexpected result: {:?}", other.map(|e| e.id.clone())),
        }
    }

    #[test]
    fn overrides_win_over_envelope() {
        let presets = BudgetPresets::new();
        let strict = presets.require("strict-v1").unwrap();
        let overrides = LimitOverrides {
            jump: Some(5),
            ..Default::default()
        };
        let limits = strict.apply_overrides(&overrides);
        assert_eq!(limits.jump, 5);
        assert_eq!(limits.throw, 10);
        assert_eq!(limits.allocation, 64 * 1024);
    }
}
