/// Audit event logging for costbox
/// Structured record of unit lifecycle and budget enforcement decisions
///
/// - Correlation by unit id (uuid v4, one per execution unit)
/// - Event types: unit start, unit end, budget violation, supervisor registration, configuration warning
/// - Every event is mirrored to the `log` facade; the JSON-lines file is optional
use crate::config::types::{AccountingError, LedgerSnapshot, Result, UnitStatus, VerdictProvenance};
use crate::core::supervisor::ThreadKey;
use crate::core::termination::Termination;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

/// Audit event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
    Info,
}

/// Types of audit events we track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    UnitStart,
    UnitEnd,
    BudgetViolation,
    SupervisorRegistered,
    ConfigurationWarning,
}

impl AuditEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::UnitStart => AuditSeverity::Info,
            AuditEventType::UnitEnd => AuditSeverity::Info,
            AuditEventType::BudgetViolation => AuditSeverity::Low,
            AuditEventType::SupervisorRegistered => AuditSeverity::Low,
            AuditEventType::ConfigurationWarning => AuditSeverity::Medium,
        }
    }
}

/// Individual audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub unit_id: Option<Uuid>,
    pub thread: Option<String>,
    pub envelope_id: Option<String>,
    pub ledger: Option<LedgerSnapshot>,
    pub verdict_provenance: Option<VerdictProvenance>,
}

impl AuditEvent {
    /// Create a new audit event with default severity
    pub fn new(event_type: AuditEventType, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            unit_id: None,
            thread: None,
            envelope_id: None,
            ledger: None,
            verdict_provenance: None,
        }
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_unit_id(mut self, unit_id: Uuid) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    pub fn with_thread(mut self, thread: String) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_envelope_id(mut self, envelope_id: String) -> Self {
        self.envelope_id = Some(envelope_id);
        self
    }

    pub fn with_ledger(mut self, ledger: LedgerSnapshot) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_verdict_provenance(mut self, provenance: VerdictProvenance) -> Self {
        self.verdict_provenance = Some(provenance);
        self
    }
}

/// Audit logger backed by an append-only JSON-lines file
pub struct AuditLogger {
    audit_file: Mutex<File>,
    audit_path: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_path: PathBuf) -> Result<Self> {
        if let Some(parent) = audit_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AccountingError::Config(format!("Failed to create audit log directory: {}", e))
                })?;
            }
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&audit_path)
            .map_err(|e| AccountingError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Mutex::new(audit_file),
            audit_path,
        })
    }

    /// Mirror the event to `log` and append it to the audit file
    pub fn log_audit_event(&self, event: &AuditEvent) {
        mirror_to_log(event);

        let mut entry = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        entry["process_id"] = serde_json::json!(std::process::id());

        if let Ok(mut file) = self.audit_file.lock() {
            if let Err(e) = writeln!(file, "{}", entry) {
                error!("Failed to write to audit log: {}", e);
            }
            if let Err(e) = file.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        } else {
            error!("Failed to acquire lock on audit file");
        }
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }
}

fn mirror_to_log(event: &AuditEvent) {
    match event.severity {
        AuditSeverity::High => error!("AUDIT HIGH: {:?} - {}", event.event_type, event.details),
        AuditSeverity::Medium => warn!("AUDIT MEDIUM: {:?} - {}", event.event_type, event.details),
        AuditSeverity::Low => info!("AUDIT: {:?} - {}", event.event_type, event.details),
        AuditSeverity::Info => debug!("AUDIT: {:?} - {}", event.event_type, event.details),
    }
}

/// Global audit logger instance
static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Initialize the global audit file. `None` keeps events on `log` only.
pub fn init_audit_log(audit_path: Option<PathBuf>) -> Result<()> {
    let Some(path) = audit_path else {
        info!("Audit file disabled; events are mirrored to the log only");
        return Ok(());
    };

    let logger = AuditLogger::new(path)?;
    let display = logger.audit_path().display().to_string();
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("Audit logger already initialized; ignoring {}", display);
    } else {
        info!("Audit logger initialized at {}", display);
    }
    Ok(())
}

/// Log an audit event using the global logger
pub fn log_audit_event(event: AuditEvent) {
    match AUDIT_LOGGER.get() {
        Some(logger) => logger.log_audit_event(&event),
        None => mirror_to_log(&event),
    }
}

/// Convenience functions for common audit events
pub mod events {
    use super::*;

    pub fn unit_start(unit_id: Uuid, worker: &str, envelope_id: &str) {
        let event = AuditEvent::new(
            AuditEventType::UnitStart,
            format!("Unit {} starting on {}", unit_id, worker),
        )
        .with_unit_id(unit_id)
        .with_thread(worker.to_string())
        .with_envelope_id(envelope_id.to_string());
        log_audit_event(event);
    }

    pub fn unit_end(unit_id: Uuid, status: UnitStatus, provenance: VerdictProvenance) {
        let event = AuditEvent::new(
            AuditEventType::UnitEnd,
            format!(
                "Unit {} finished: {} ({:?}) in {}ms",
                unit_id, status, provenance.verdict_cause, provenance.wall_time_ms
            ),
        )
        .with_unit_id(unit_id)
        .with_envelope_id(provenance.envelope_id.clone())
        .with_ledger(provenance.ledger)
        .with_verdict_provenance(provenance);

        // Contradictory evidence points at a host or instrumentation fault.
        let event = if status == UnitStatus::InternalError {
            event.with_severity(AuditSeverity::High)
        } else {
            event
        };
        log_audit_event(event);
    }

    pub fn budget_violation(
        termination: &Termination,
        unit_id: Option<Uuid>,
        thread: &str,
        ledger: LedgerSnapshot,
    ) {
        let event = AuditEvent::new(
            AuditEventType::BudgetViolation,
            format!("Contract {} terminated: {}", thread, termination),
        )
        .with_thread(thread.to_string())
        .with_ledger(ledger);

        let event = if let Some(id) = unit_id {
            event.with_unit_id(id)
        } else {
            event
        };
        log_audit_event(event);
    }

    pub fn supervisor_registered(key: ThreadKey) {
        log_audit_event(supervisor_event(key));
    }

    pub(super) fn supervisor_event(key: ThreadKey) -> AuditEvent {
        let event = AuditEvent::new(
            AuditEventType::SupervisorRegistered,
            format!("Thread key {} exempt from accounting", key.get()),
        );
        // Only the owning thread can name itself.
        if key != ThreadKey::current() {
            return event;
        }
        match std::thread::current().name() {
            Some(name) => event.with_thread(name.to_string()),
            None => event,
        }
    }

    pub fn configuration_warning(message: &str) {
        log_audit_event(AuditEvent::new(
            AuditEventType::ConfigurationWarning,
            message.to_string(),
        ));
    }
}
