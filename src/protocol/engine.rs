use crate::audit;
use crate::errors::{AppError, PreconditionFailed};
use crate::models::execution::{NewExecution, ProtocolExecution, StepCompletion};
use crate::models::template::{ProtocolStep, ProtocolTemplate};
use crate::repository::ProtocolRepository;
use super::{ProtocolService, catalog, non_blank};

pub fn is_step_completed(execution: &ProtocolExecution, step_order: u32) -> bool {
    execution.completion(step_order).is_some()
}

/// Orders of required steps that have no completion yet.
pub fn missing_required_steps(execution: &ProtocolExecution, steps: &[ProtocolStep]) -> Vec<u32> {
    steps
        .iter()
        .filter(|s| s.is_required && !is_step_completed(execution, s.order))
        .map(|s| s.order)
        .collect()
}

/// True iff every required step has a completion. Optional steps never matter.
pub fn all_required_steps_complete(execution: &ProtocolExecution, steps: &[ProtocolStep]) -> bool {
    missing_required_steps(execution, steps).is_empty()
}

fn ensure_open(execution: &ProtocolExecution) -> Result<(), AppError> {
    if execution.status.is_closed() {
        return Err(AppError::Precondition(PreconditionFailed::ExecutionClosed {
            execution_id: execution.id,
        }));
    }
    Ok(())
}

impl<R: ProtocolRepository> ProtocolService<R> {
    /// Open an execution for an alert.
    ///
    /// Uses `template_id` when given (it must match the alert's type), otherwise the active template for the
    /// alert's type, otherwise the default catalog (`template_id = None`).
    /// A second open execution for the same alert is a conflict naming the first.
    pub async fn start_execution(
        &self,
        alert_id: i64,
        actor_id: i64,
        template_id: Option<i64>,
    ) -> Result<ProtocolExecution, AppError> {
        let alert = self
            .repo
            .find_alert(alert_id)
            .await?
            .ok_or_else(|| AppError::not_found("alert", alert_id))?;

        let template: Option<ProtocolTemplate> = match template_id {
            Some(id) => {
                let template = self.get_template(id).await?;
                if template.organization_id != alert.organization_id {
                    return Err(AppError::not_found("template", id));
                }
                if template.alert_type != alert.alert_type {
                    log::warn!(
                        "Refused template {id} ({}) for alert {alert_id} ({})",
                        template.alert_type,
                        alert.alert_type
                    );
                    return Err(AppError::validation(
                        "template_id",
                        format!(
                            "template {id} is for '{}' alerts, not '{}'",
                            template.alert_type, alert.alert_type
                        ),
                    ));
                }
                Some(template)
            }
            None => {
                self.repo
                    .find_active_template(alert.organization_id, &alert.alert_type)
                    .await?
            }
        };

        let new = NewExecution {
            organization_id: alert.organization_id,
            alert_id,
            template_id: template.as_ref().map(|t| t.id),
            started_at: self.now(),
            started_by: actor_id,
        };
        let execution = match self.repo.insert_execution(&new).await {
            Ok(execution) => execution,
            Err(e) => {
                log::warn!("Refused to start execution for alert {alert_id}: {e}");
                return Err(e);
            }
        };

        log::info!(
            "Started execution {} for alert {} ({}) using {}",
            execution.id,
            alert_id,
            alert.alert_type,
            match &template {
                Some(t) => format!("template {}", t.id),
                None => format!("default catalog v{}", catalog::CATALOG_VERSION),
            }
        );
        audit::log(
            actor_id,
            "protocol_execution.started",
            "protocol_execution",
            execution.id,
            serde_json::json!({
                "alert_id": alert_id,
                "alert_type": alert.alert_type,
                "template_id": execution.template_id,
            }),
        );
        Ok(execution)
    }

    pub async fn get_execution(&self, id: i64) -> Result<ProtocolExecution, AppError> {
        self.repo
            .find_execution(id)
            .await?
            .ok_or_else(|| AppError::not_found("execution", id))
    }

    /// Every execution ever opened for an alert, oldest first.
    pub async fn list_executions_for_alert(&self, alert_id: i64) -> Result<Vec<ProtocolExecution>, AppError> {
        if self.repo.find_alert(alert_id).await?.is_none() {
            return Err(AppError::not_found("alert", alert_id));
        }
        self.repo.list_executions_for_alert(alert_id).await
    }

    /// The template an execution follows, if it is not on the default catalog.
    /// Soft-deleted templates still resolve.
    pub async fn execution_template(&self, execution: &ProtocolExecution) -> Result<Option<ProtocolTemplate>, AppError> {
        match execution.template_id {
            Some(id) => self
                .repo
                .find_template(id)
                .await?
                .map(Some)
                .ok_or_else(|| AppError::not_found("template", id)),
            None => Ok(None),
        }
    }

    /// Steps that apply to an execution: its template's, or the default catalog's.
    pub async fn effective_steps(&self, execution: &ProtocolExecution) -> Result<Vec<ProtocolStep>, AppError> {
        if let Some(template) = self.execution_template(execution).await? {
            return Ok(template.steps);
        }
        let alert = self
            .repo
            .find_alert(execution.alert_id)
            .await?
            .ok_or_else(|| AppError::not_found("alert", execution.alert_id))?;
        Ok(catalog::default_steps(&alert.alert_type))
    }

    /// Record that a step was performed. Repeating a step replaces its record.
    /// Steps may be completed in any order, also while escalated.
    pub async fn complete_step(
        &self,
        execution_id: i64,
        step_order: u32,
        actor_id: i64,
        notes: Option<String>,
        evidence_ref: Option<String>,
    ) -> Result<ProtocolExecution, AppError> {
        let execution = self.get_execution(execution_id).await?;
        ensure_open(&execution)?;

        let steps = self.effective_steps(&execution).await?;
        let Some(step) = steps.iter().find(|s| s.order == step_order) else {
            log::warn!("Execution {execution_id} has no step {step_order}");
            return Err(AppError::not_found("step", i64::from(step_order)));
        };

        let completion = StepCompletion {
            step_order,
            completed_at: self.now(),
            completed_by: actor_id,
            notes: non_blank(notes),
            evidence_ref: non_blank(evidence_ref),
        };
        if step.photo_required && completion.evidence_ref.is_none() {
            log::warn!("Step {step_order} of execution {execution_id} completed without photo evidence");
        }
        self.repo.upsert_completion(execution_id, &completion).await?;

        log::info!("Execution {execution_id}: step {step_order} completed by {actor_id}");
        audit::log(
            actor_id,
            "protocol_execution.step_completed",
            "protocol_execution",
            execution_id,
            serde_json::json!({
                "step_order": step_order,
                "evidence_ref": completion.evidence_ref,
            }),
        );
        self.get_execution(execution_id).await
    }
}
