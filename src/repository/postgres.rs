use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::errors::{AppError, ConflictKind, PreconditionFailed};
use crate::models::alert::{self, Alert, AlertResolution, AlertType};
use crate::models::execution::{
    self, Closure, Escalation, ExecutionStatus, NewExecution, ProtocolExecution, StepCompletion,
};
use crate::models::template::{self, ProtocolTemplate, TemplateDraft};
use super::ProtocolRepository;

const ONE_ACTIVE_TEMPLATE: &str = "protocol_templates_one_active";
const ONE_OPEN_EXECUTION: &str = "protocol_executions_one_open_per_alert";

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation() && db.constraint() == Some(constraint),
        _ => false,
    }
}

/// Postgres-backed repository. Conditional writes rely on the partial unique
/// indexes from the migrations, not on read-then-write checks alone.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn active_template_conflict(
        &self,
        organization_id: i64,
        alert_type: &AlertType,
        exclude_id: Option<i64>,
    ) -> AppError {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return AppError::Db(e),
        };
        match template::queries::find_other_active_id(&mut conn, organization_id, alert_type, exclude_id).await {
            Ok(Some(template_id)) => AppError::Conflict(ConflictKind::ActiveTemplateExists {
                alert_type: alert_type.to_string(),
                template_id,
            }),
            Ok(None) => AppError::validation("is_active", "another template became active concurrently"),
            Err(e) => e,
        }
    }

    /// After a conditional execution write matched no row, decide why.
    async fn explain_missing_write(&self, execution_id: i64) -> AppError {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return AppError::Db(e),
        };
        match execution::queries::status_of(&mut conn, execution_id).await {
            Ok(Some(ExecutionStatus::Closed)) => {
                AppError::Precondition(PreconditionFailed::ExecutionClosed { execution_id })
            }
            Ok(_) => AppError::not_found("execution", execution_id),
            Err(e) => e,
        }
    }
}

impl ProtocolRepository for PgRepository {
    async fn list_templates(
        &self,
        organization_id: i64,
        alert_type: Option<&AlertType>,
    ) -> Result<Vec<ProtocolTemplate>, AppError> {
        let mut conn = self.pool.acquire().await?;
        template::queries::list(&mut conn, organization_id, alert_type).await
    }

    async fn find_template(&self, id: i64) -> Result<Option<ProtocolTemplate>, AppError> {
        let mut conn = self.pool.acquire().await?;
        template::queries::find_by_id(&mut conn, id).await
    }

    async fn find_active_template(
        &self,
        organization_id: i64,
        alert_type: &AlertType,
    ) -> Result<Option<ProtocolTemplate>, AppError> {
        let mut conn = self.pool.acquire().await?;
        template::queries::find_active(&mut conn, organization_id, alert_type).await
    }

    async fn insert_templates(&self, drafts: &[TemplateDraft]) -> Result<Vec<ProtocolTemplate>, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            if draft.is_active {
                if let Some(template_id) = template::queries::find_other_active_id(
                    &mut tx,
                    draft.organization_id,
                    &draft.alert_type,
                    None,
                )
                .await?
                {
                    return Err(AppError::Conflict(ConflictKind::ActiveTemplateExists {
                        alert_type: draft.alert_type.to_string(),
                        template_id,
                    }));
                }
            }
            match template::queries::insert(&mut tx, draft).await {
                Ok(id) => ids.push(id),
                Err(AppError::Db(e)) if violates(&e, ONE_ACTIVE_TEMPLATE) => {
                    tx.rollback().await?;
                    return Err(self
                        .active_template_conflict(draft.organization_id, &draft.alert_type, None)
                        .await);
                }
                Err(e) => return Err(e),
            }
        }

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(t) = template::queries::find_by_id(&mut tx, id).await? {
                created.push(t);
            }
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn update_template(&self, template: &ProtocolTemplate) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if template.is_active {
            if let Some(other) = template::queries::find_other_active_id(
                &mut tx,
                template.organization_id,
                &template.alert_type,
                Some(template.id),
            )
            .await?
            {
                return Err(AppError::Conflict(ConflictKind::ActiveTemplateExists {
                    alert_type: template.alert_type.to_string(),
                    template_id: other,
                }));
            }
        }

        match template::queries::update(&mut tx, template).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::not_found("template", template.id)),
            Err(AppError::Db(e)) if violates(&e, ONE_ACTIVE_TEMPLATE) => {
                tx.rollback().await?;
                return Err(self
                    .active_template_conflict(template.organization_id, &template.alert_type, Some(template.id))
                    .await);
            }
            Err(e) => return Err(e),
        }
        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete_template(&self, id: i64, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        if template::queries::soft_delete(&mut conn, id, now).await? {
            Ok(())
        } else {
            Err(AppError::not_found("template", id))
        }
    }

    async fn find_alert(&self, id: i64) -> Result<Option<Alert>, AppError> {
        alert::queries::find_by_id(&self.pool, id).await
    }

    async fn insert_execution(&self, new: &NewExecution) -> Result<ProtocolExecution, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut retried = false;
        let id = loop {
            match execution::queries::insert(&mut conn, new).await {
                Ok(id) => break id,
                Err(e) if violates(&e, ONE_OPEN_EXECUTION) => {
                    // The blocking execution may have closed since the insert failed.
                    match execution::queries::find_open_id_for_alert(&mut conn, new.alert_id).await? {
                        Some(execution_id) => {
                            return Err(AppError::Conflict(ConflictKind::OpenExecutionExists {
                                alert_id: new.alert_id,
                                execution_id,
                            }));
                        }
                        None if !retried => retried = true,
                        None => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        execution::queries::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::not_found("execution", id))
    }

    async fn find_execution(&self, id: i64) -> Result<Option<ProtocolExecution>, AppError> {
        let mut conn = self.pool.acquire().await?;
        execution::queries::find_by_id(&mut conn, id).await
    }

    async fn list_executions_for_alert(&self, alert_id: i64) -> Result<Vec<ProtocolExecution>, AppError> {
        let mut conn = self.pool.acquire().await?;
        execution::queries::list_for_alert(&mut conn, alert_id).await
    }

    async fn upsert_completion(&self, execution_id: i64, completion: &StepCompletion) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        if execution::queries::upsert_completion(&mut conn, execution_id, completion).await? {
            Ok(())
        } else {
            Err(self.explain_missing_write(execution_id).await)
        }
    }

    async fn escalate(&self, execution_id: i64, escalation: &Escalation) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        if execution::queries::set_escalation(&mut conn, execution_id, escalation).await? {
            Ok(())
        } else {
            Err(self.explain_missing_write(execution_id).await)
        }
    }

    async fn close_and_resolve(
        &self,
        execution_id: i64,
        alert_id: i64,
        closure: &Closure,
        resolution: &AlertResolution,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if !execution::queries::close(&mut tx, execution_id, closure).await? {
            tx.rollback().await?;
            return Err(self.explain_missing_write(execution_id).await);
        }
        if !alert::queries::resolve(&mut *tx, alert_id, resolution).await? {
            tx.rollback().await?;
            return Err(AppError::not_found("alert", alert_id));
        }

        tx.commit().await?;
        Ok(())
    }
}
