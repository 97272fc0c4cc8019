use serde::Serialize;

use crate::audit;
use crate::errors::{AppError, PreconditionFailed};
use crate::models::alert::AlertResolution;
use crate::models::execution::{Closure, ExecutionStatus, ProtocolExecution};
use crate::models::template::ProtocolStep;
use crate::repository::ProtocolRepository;
use super::engine::missing_required_steps;
use super::{ProtocolService, non_blank};

/// Whether an execution may close right now, and what is still missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosureEligibility {
    pub execution_id: i64,
    pub status: ExecutionStatus,
    pub can_close: bool,
    pub missing_required: Vec<u32>,
    /// Completed photo-required steps without evidence. Blocks closure only when enforced.
    pub missing_evidence: Vec<u32>,
    pub evidence_enforced: bool,
}

/// Completed photo-required steps that carry no evidence reference.
pub fn missing_evidence(execution: &ProtocolExecution, steps: &[ProtocolStep]) -> Vec<u32> {
    steps
        .iter()
        .filter(|s| s.photo_required)
        .filter(|s| {
            execution
                .completion(s.order)
                .is_some_and(|c| c.evidence_ref.is_none())
        })
        .map(|s| s.order)
        .collect()
}

impl<R: ProtocolRepository> ProtocolService<R> {
    fn eligibility_for(&self, execution: &ProtocolExecution, steps: &[ProtocolStep]) -> ClosureEligibility {
        let missing_required = missing_required_steps(execution, steps);
        let missing_evidence = missing_evidence(execution, steps);
        let evidence_enforced = self.config.enforce_photo_evidence;
        let can_close = !execution.status.is_closed()
            && missing_required.is_empty()
            && (!evidence_enforced || missing_evidence.is_empty());

        ClosureEligibility {
            execution_id: execution.id,
            status: execution.status,
            can_close,
            missing_required,
            missing_evidence,
            evidence_enforced,
        }
    }

    pub async fn closure_eligibility(&self, execution_id: i64) -> Result<ClosureEligibility, AppError> {
        let execution = self.get_execution(execution_id).await?;
        let steps = self.effective_steps(&execution).await?;
        Ok(self.eligibility_for(&execution, &steps))
    }

    /// Close an execution and resolve its alert as one atomic write.
    ///
    /// Requires every required step to be complete (and, when enforced, photo
    /// evidence on completed photo steps). Escalated executions use the same gate.
    pub async fn close_execution(
        &self,
        execution_id: i64,
        actor_id: i64,
        notes: Option<String>,
    ) -> Result<ProtocolExecution, AppError> {
        let execution = self.get_execution(execution_id).await?;
        let steps = self.effective_steps(&execution).await?;
        let eligibility = self.eligibility_for(&execution, &steps);

        if !eligibility.can_close {
            let reason = if execution.status.is_closed() {
                PreconditionFailed::ExecutionClosed { execution_id }
            } else if !eligibility.missing_required.is_empty() {
                PreconditionFailed::RequiredStepsIncomplete {
                    execution_id,
                    missing: eligibility.missing_required,
                }
            } else {
                PreconditionFailed::EvidenceMissing {
                    execution_id,
                    missing: eligibility.missing_evidence,
                }
            };
            log::warn!("Refused to close execution {execution_id}: {reason}");
            return Err(AppError::Precondition(reason));
        }

        let now = self.now();
        let notes = non_blank(notes);
        let closure = Closure {
            completed_at: now,
            completed_by: actor_id,
            notes: notes.clone(),
        };
        let resolution = AlertResolution {
            resolved_at: now,
            resolved_by: actor_id,
            resolution_notes: notes,
        };
        self.repo
            .close_and_resolve(execution_id, execution.alert_id, &closure, &resolution)
            .await?;

        log::info!(
            "Closed execution {execution_id} and resolved alert {} (was {})",
            execution.alert_id,
            execution.status
        );
        audit::log(
            actor_id,
            "protocol_execution.closed",
            "protocol_execution",
            execution_id,
            serde_json::json!({
                "alert_id": execution.alert_id,
                "previous_status": execution.status,
                "steps_completed": execution.completions.len(),
            }),
        );
        self.get_execution(execution_id).await
    }
}
