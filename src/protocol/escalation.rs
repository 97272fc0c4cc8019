use crate::audit;
use crate::errors::{AppError, PreconditionFailed};
use crate::models::execution::{Escalation, ProtocolExecution};
use crate::repository::ProtocolRepository;
use super::{ProtocolService, non_blank};

impl<R: ProtocolRepository> ProtocolService<R> {
    /// Flag an execution as escalated to higher authority.
    ///
    /// Allowed from `in_progress` and `escalated` (the latest escalation wins),
    /// refused once closed. Completes no steps and leaves the alert untouched.
    pub async fn escalate(
        &self,
        execution_id: i64,
        actor_id: i64,
        reason: &str,
        escalate_to: Option<String>,
    ) -> Result<ProtocolExecution, AppError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::validation("reason", "an escalation reason is required"));
        }

        let execution = self.get_execution(execution_id).await?;
        if execution.status.is_closed() {
            log::warn!("Refused to escalate closed execution {execution_id}");
            return Err(AppError::Precondition(PreconditionFailed::ExecutionClosed { execution_id }));
        }

        let escalation = Escalation {
            reason: reason.to_string(),
            escalated_at: self.now(),
            escalated_by: actor_id,
            escalated_to: non_blank(escalate_to),
        };
        self.repo.escalate(execution_id, &escalation).await?;

        log::info!(
            "Execution {execution_id} escalated by {actor_id}{}",
            escalation
                .escalated_to
                .as_deref()
                .map(|to| format!(" to {to}"))
                .unwrap_or_default()
        );
        audit::log(
            actor_id,
            "protocol_execution.escalated",
            "protocol_execution",
            execution_id,
            serde_json::json!({
                "reason": escalation.reason,
                "escalated_to": escalation.escalated_to,
                "previous_status": execution.status,
            }),
        );
        self.get_execution(execution_id).await
    }
}
