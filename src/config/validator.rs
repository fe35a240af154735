// Budget validation
// Strict mode validates limits at startup and fails fast with actionable errors

use crate::config::loader::AccountingConfig;
use crate::config::presets::BudgetPresets;
use crate::config::types::{AccountingError, CostLane, CostLimits, Result};
use crate::observability::audit;

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a limit set.
/// Errors are fatal in strict mode; in permissive mode they are returned for the caller to report.
pub fn validate_limits(limits: &CostLimits, strict_mode: bool) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();
    check_limits(limits, &mut result);
    finish(result, strict_mode)
}

/// Validate a loaded configuration file
pub fn validate_config(config: &AccountingConfig, presets: &BudgetPresets) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    match config.effective_limits(presets) {
        Ok(limits) => check_limits(&limits, &mut result),
        Err(AccountingError::UnknownPreset(id)) => {
            result.add_error(format!(
                "preset '{}' is not registered (known: {})",
                id,
                presets.list().join(", ")
            ));
        }
        Err(e) => return Err(e),
    }

    if config.workers == Some(0) {
        result.add_error("workers cannot be zero".to_string());
    }

    if let Some(path) = &config.audit_log {
        if !path.is_absolute() {
            result.add_warning(format!(
                "audit_log {} is relative; it resolves against the host working directory",
                path.display()
            ));
        }
    }

    finish(result, config.strict_mode)
}

fn check_limits(limits: &CostLimits, result: &mut ValidationResult) {
    for lane in CostLane::ALL {
        let limit = limits.limit(lane);
        if limit == 0 {
            // Every unit would die on its first instrumented operation.
            result.add_error(format!("{} limit cannot be zero", lane));
        } else if limit == u64::MAX {
            result.add_warning(format!("{} limit is u64::MAX; lane is effectively unmetered", lane));
        }
    }
}

fn finish(result: ValidationResult, strict_mode: bool) -> Result<ValidationResult> {
    for warning in &result.warnings {
        log::warn!("Budget validation: {}", warning);
        audit::events::configuration_warning(warning);
    }

    if strict_mode && !result.is_valid() {
        let error_msg = format!(
            "Budget validation failed in strict mode:\n{}",
            result.errors.join("\n")
        );
        return Err(AccountingError::Config(error_msg));
    }

    Ok(result)
}
