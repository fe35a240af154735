/// Configuration loading from a JSON budget file
use crate::config::presets::{BudgetPresets, DEFAULT_PRESET};
use crate::config::types::{CostLimits, LimitOverrides, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_strict_mode() -> bool {
    true
}

/// Accounting configuration as written in a budget file.
///
/// ```json
/// {
///   "preset": "strict-v1",
///   "limits": { "jump": 500 },
///   "strict_mode": true,
///   "workers": 4,
///   "audit_log": "/var/log/costbox/audit.jsonl"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountingConfig {
    /// Budget envelope to start from (defaults to `baseline-v1`)
    #[serde(default)]
    pub preset: Option<String>,
    /// Per-lane overrides applied on top of the preset
    #[serde(default)]
    pub limits: LimitOverrides,
    /// Strict mode: validation errors are fatal
    #[serde(default = "default_strict_mode")]
    pub strict_mode: bool,
    /// Number of pooled worker threads
    #[serde(default)]
    pub workers: Option<usize>,
    /// JSON-lines audit trail destination
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            preset: None,
            limits: LimitOverrides::default(),
            strict_mode: true,
            workers: None,
            audit_log: None,
        }
    }
}

impl AccountingConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded accounting configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn preset_id(&self) -> &str {
        self.preset.as_deref().unwrap_or(DEFAULT_PRESET)
    }

    /// Resolve preset + overrides into the limits the accountant enforces
    pub fn effective_limits(&self, presets: &BudgetPresets) -> Result<CostLimits> {
        let envelope = presets.require(self.preset_id())?;
        Ok(envelope.apply_overrides(&self.limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::AccountingError;

    #[test]
    fn empty_document_uses_baseline_strict_defaults() {
        let config = AccountingConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AccountingConfig::default());
        assert!(config.strict_mode);

        let limits = config.effective_limits(&BudgetPresets::new()).unwrap();
        assert_eq!(limits, CostLimits::default());
    }

    #[test]
    fn preset_and_overrides_are_combined() {
        let config = AccountingConfig::from_json_str(
            r#"{ "preset": "batch-v1", "limits": { "throw": 7 }, "workers": 2 }"#,
        )
        .unwrap();
        let limits = config.effective_limits(&BudgetPresets::new()).unwrap();
        assert_eq!(limits.throw, 7);
        assert_eq!(limits.jump, 10_000);
        assert_eq!(config.workers, Some(2));
    }

    #[test]
    fn unknown_preset_fails_resolution() {
        let config = AccountingConfig::from_json_str(r#"{ "preset": "nope" }"#).unwrap();
        assert!(matches!(
            config.effective_limits(&BudgetPresets::new()),
            Err(AccountingError::UnknownPreset(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            AccountingConfig::from_json_str("{ preset: "),
            Err(AccountingError::Json(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("costbox-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "limits": { "jump": 3 }, "strict_mode": false }"#).unwrap();

        let config = AccountingConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(!config.strict_mode);
        assert_eq!(config.limits.jump, Some(3));
    }
}
