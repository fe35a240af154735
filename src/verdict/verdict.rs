/// Verdict classification and provenance
/// Derives a unit's status as a pure function of its report: the outcome the
/// host observed, cross-checked against the ledger and the limit snapshot.
use crate::config::types::*;
use crate::core::termination::Termination;
use crate::core::types::{UnitOutcome, UnitReport};

/// Verdict classifier - pure function over a unit report
pub struct VerdictClassifier;

impl VerdictClassifier {
    /// Classify a finished unit.
    /// Deterministic: the same report always yields the same verdict.
    pub fn classify<T>(report: &UnitReport<T>) -> (UnitStatus, VerdictProvenance) {
        if report.envelope_id != report.limits.envelope_id() {
            return Self::classify_internal_error(
                report,
                "envelope id does not match the limit snapshot",
            );
        }

        match &report.outcome {
            UnitOutcome::Terminated(termination) => Self::classify_termination(report, termination),
            UnitOutcome::Panicked(message) => Self::classify_runtime_error(report, message),
            UnitOutcome::Completed(_) => match report.ledger.first_exceeded(&report.limits) {
                // A live unit can never hold an over-limit ledger.
                Some(lane) => Self::classify_internal_error(
                    report,
                    &format!("unit completed with {} cost over its limit", lane),
                ),
                None => Self::classify_ok(report),
            },
        }
    }

    fn classify_ok<T>(report: &UnitReport<T>) -> (UnitStatus, VerdictProvenance) {
        let provenance = Self::provenance(
            report,
            VerdictActor::Runtime,
            VerdictCause::NormalCompletion,
            vec!["unit_outcome".to_string(), "ledger".to_string()],
            None,
            None,
        );
        (UnitStatus::Ok, provenance)
    }

    fn classify_termination<T>(
        report: &UnitReport<T>,
        termination: &Termination,
    ) -> (UnitStatus, VerdictProvenance) {
        let lane = termination.lane();
        if report.ledger.get(lane) <= report.limits.limit(lane) {
            return Self::classify_internal_error(
                report,
                &format!(
                    "termination on {} but ledger shows {} within limit {}",
                    lane,
                    report.ledger.get(lane),
                    report.limits.limit(lane)
                ),
            );
        }

        let provenance = Self::provenance(
            report,
            VerdictActor::Accountant,
            VerdictCause::for_lane(lane),
            vec![
                "termination_signal".to_string(),
                "ledger".to_string(),
                "limit_snapshot".to_string(),
            ],
            Some(lane),
            Some(termination.to_string()),
        );
        (UnitStatus::BudgetExceeded, provenance)
    }

    fn classify_runtime_error<T>(
        report: &UnitReport<T>,
        message: &str,
    ) -> (UnitStatus, VerdictProvenance) {
        let provenance = Self::provenance(
            report,
            VerdictActor::Runtime,
            VerdictCause::ReUnitPanic,
            vec!["unit_outcome".to_string(), "panic_payload".to_string()],
            None,
            Some(message.to_string()),
        );
        (UnitStatus::RuntimeError, provenance)
    }

    fn classify_internal_error<T>(
        report: &UnitReport<T>,
        reason: &str,
    ) -> (UnitStatus, VerdictProvenance) {
        let provenance = Self::provenance(
            report,
            VerdictActor::Host,
            VerdictCause::IeContradictoryEvidence,
            vec!["unit_outcome".to_string(), "ledger".to_string()],
            None,
            Some(reason.to_string()),
        );
        (UnitStatus::InternalError, provenance)
    }

    fn provenance<T>(
        report: &UnitReport<T>,
        actor: VerdictActor,
        cause: VerdictCause,
        sources: Vec<String>,
        triggering_lane: Option<CostLane>,
        detail: Option<String>,
    ) -> VerdictProvenance {
        VerdictProvenance {
            verdict_actor: actor,
            verdict_cause: cause,
            verdict_evidence_sources: sources,
            triggering_lane,
            ledger: report.ledger,
            limit_snapshot: report.limits,
            envelope_id: report.envelope_id.clone(),
            wall_time_ms: report.wall_time_ms,
            detail,
        }
    }
}
