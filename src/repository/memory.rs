use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::{AppError, ConflictKind, PreconditionFailed};
use crate::models::alert::{Alert, AlertResolution, AlertType};
use crate::models::execution::{
    Closure, Escalation, ExecutionStatus, NewExecution, ProtocolExecution, StepCompletion,
};
use crate::models::template::{ProtocolTemplate, TemplateDraft};
use super::ProtocolRepository;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    alerts: HashMap<i64, Alert>,
    templates: BTreeMap<i64, ProtocolTemplate>,
    executions: BTreeMap<i64, ProtocolExecution>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn other_active_template(&self, organization_id: i64, alert_type: &AlertType, exclude: Option<i64>) -> Option<i64> {
        self.templates
            .values()
            .filter(|t| {
                t.organization_id == organization_id
                    && &t.alert_type == alert_type
                    && t.is_active
                    && !t.is_deleted()
                    && Some(t.id) != exclude
            })
            .max_by_key(|t| (t.created_at, t.id))
            .map(|t| t.id)
    }

    /// Open execution for the requested id, or the matching error.
    fn open_execution_mut(&mut self, execution_id: i64) -> Result<&mut ProtocolExecution, AppError> {
        let execution = self
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| AppError::not_found("execution", execution_id))?;
        if execution.status.is_closed() {
            return Err(AppError::Precondition(PreconditionFailed::ExecutionClosed { execution_id }));
        }
        Ok(execution)
    }
}

/// Repository held entirely in memory behind one lock, so every method is atomic.
///
/// Used by the test suite and for running the API without a database. Clones
/// share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<State>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alert, standing in for the ingestion subsystem. Returns its id.
    pub async fn insert_alert(&self, organization_id: i64, alert_type: AlertType, created_at: DateTime<Utc>) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.alerts.insert(
            id,
            Alert {
                id,
                organization_id,
                alert_type,
                created_at,
                resolved_at: None,
                resolved_by: None,
                resolution_notes: None,
            },
        );
        id
    }
}

impl ProtocolRepository for MemoryRepository {
    async fn list_templates(
        &self,
        organization_id: i64,
        alert_type: Option<&AlertType>,
    ) -> Result<Vec<ProtocolTemplate>, AppError> {
        let state = self.state.lock().await;
        let mut templates: Vec<ProtocolTemplate> = state
            .templates
            .values()
            .filter(|t| t.organization_id == organization_id && !t.is_deleted())
            .filter(|t| alert_type.is_none_or(|at| &t.alert_type == at))
            .cloned()
            .collect();
        templates.sort_by(|a, b| {
            a.alert_type
                .as_str()
                .cmp(b.alert_type.as_str())
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(templates)
    }

    async fn find_template(&self, id: i64) -> Result<Option<ProtocolTemplate>, AppError> {
        Ok(self.state.lock().await.templates.get(&id).cloned())
    }

    async fn find_active_template(
        &self,
        organization_id: i64,
        alert_type: &AlertType,
    ) -> Result<Option<ProtocolTemplate>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .other_active_template(organization_id, alert_type, None)
            .and_then(|id| state.templates.get(&id).cloned()))
    }

    async fn insert_templates(&self, drafts: &[TemplateDraft]) -> Result<Vec<ProtocolTemplate>, AppError> {
        let mut state = self.state.lock().await;

        // Validate the whole batch before writing anything.
        let mut claimed: HashSet<(i64, &str)> = HashSet::new();
        for draft in drafts.iter().filter(|d| d.is_active) {
            if let Some(template_id) = state.other_active_template(draft.organization_id, &draft.alert_type, None) {
                return Err(AppError::Conflict(ConflictKind::ActiveTemplateExists {
                    alert_type: draft.alert_type.to_string(),
                    template_id,
                }));
            }
            if !claimed.insert((draft.organization_id, draft.alert_type.as_str())) {
                return Err(AppError::validation(
                    "is_active",
                    format!("more than one active template for '{}' in one batch", draft.alert_type),
                ));
            }
        }

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = state.next_id();
            let template = ProtocolTemplate {
                id,
                organization_id: draft.organization_id,
                alert_type: draft.alert_type.clone(),
                name: draft.name.clone(),
                name_localized: draft.name_localized.clone(),
                steps: draft.steps.clone(),
                sla_minutes: draft.sla_minutes,
                is_active: draft.is_active,
                created_at: draft.created_at,
                updated_at: draft.created_at,
                deleted_at: None,
            };
            state.templates.insert(id, template.clone());
            created.push(template);
        }
        Ok(created)
    }

    async fn update_template(&self, template: &ProtocolTemplate) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        match state.templates.get(&template.id) {
            Some(existing) if !existing.is_deleted() => {}
            _ => return Err(AppError::not_found("template", template.id)),
        }
        if template.is_active {
            if let Some(other) =
                state.other_active_template(template.organization_id, &template.alert_type, Some(template.id))
            {
                return Err(AppError::Conflict(ConflictKind::ActiveTemplateExists {
                    alert_type: template.alert_type.to_string(),
                    template_id: other,
                }));
            }
        }
        state.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn soft_delete_template(&self, id: i64, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        match state.templates.get_mut(&id) {
            Some(template) if !template.is_deleted() => {
                template.deleted_at = Some(now);
                template.updated_at = now;
                Ok(())
            }
            _ => Err(AppError::not_found("template", id)),
        }
    }

    async fn find_alert(&self, id: i64) -> Result<Option<Alert>, AppError> {
        Ok(self.state.lock().await.alerts.get(&id).cloned())
    }

    async fn insert_execution(&self, new: &NewExecution) -> Result<ProtocolExecution, AppError> {
        let mut state = self.state.lock().await;
        if let Some(open) = state
            .executions
            .values()
            .find(|e| e.alert_id == new.alert_id && !e.status.is_closed())
        {
            return Err(AppError::Conflict(ConflictKind::OpenExecutionExists {
                alert_id: new.alert_id,
                execution_id: open.id,
            }));
        }

        let id = state.next_id();
        let execution = ProtocolExecution {
            id,
            organization_id: new.organization_id,
            alert_id: new.alert_id,
            template_id: new.template_id,
            status: ExecutionStatus::InProgress,
            started_at: new.started_at,
            started_by: new.started_by,
            escalation: None,
            closure: None,
            completions: Vec::new(),
        };
        state.executions.insert(id, execution.clone());
        Ok(execution)
    }

    async fn find_execution(&self, id: i64) -> Result<Option<ProtocolExecution>, AppError> {
        Ok(self.state.lock().await.executions.get(&id).cloned())
    }

    async fn list_executions_for_alert(&self, alert_id: i64) -> Result<Vec<ProtocolExecution>, AppError> {
        let state = self.state.lock().await;
        let mut executions: Vec<ProtocolExecution> = state
            .executions
            .values()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| (e.started_at, e.id));
        Ok(executions)
    }

    async fn upsert_completion(&self, execution_id: i64, completion: &StepCompletion) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.open_execution_mut(execution_id)?.record_completion(completion.clone());
        Ok(())
    }

    async fn escalate(&self, execution_id: i64, escalation: &Escalation) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let execution = state.open_execution_mut(execution_id)?;
        execution.status = ExecutionStatus::Escalated;
        execution.escalation = Some(escalation.clone());
        Ok(())
    }

    async fn close_and_resolve(
        &self,
        execution_id: i64,
        alert_id: i64,
        closure: &Closure,
        resolution: &AlertResolution,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        // Check both sides before touching either.
        state.open_execution_mut(execution_id)?;
        if !state.alerts.contains_key(&alert_id) {
            return Err(AppError::not_found("alert", alert_id));
        }

        if let Some(alert) = state.alerts.get_mut(&alert_id) {
            alert.resolved_at = Some(resolution.resolved_at);
            alert.resolved_by = Some(resolution.resolved_by);
            alert.resolution_notes = resolution.resolution_notes.clone();
        }
        let execution = state.open_execution_mut(execution_id)?;
        execution.status = ExecutionStatus::Closed;
        execution.closure = Some(closure.clone());
        Ok(())
    }
}
