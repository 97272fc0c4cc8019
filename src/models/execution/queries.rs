use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::collections::HashMap;

use crate::errors::AppError;
use super::types::*;

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: i64,
    organization_id: i64,
    alert_id: i64,
    template_id: Option<i64>,
    status: String,
    started_at: DateTime<Utc>,
    started_by: i64,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<i64>,
    closure_notes: Option<String>,
    escalation_reason: Option<String>,
    escalated_at: Option<DateTime<Utc>>,
    escalated_by: Option<i64>,
    escalated_to: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CompletionRow {
    execution_id: i64,
    step_order: i32,
    completed_at: DateTime<Utc>,
    completed_by: i64,
    notes: Option<String>,
    evidence_ref: Option<String>,
}

const EXECUTION_COLUMNS: &str = "id, organization_id, alert_id, template_id, status, started_at, started_by, \
     completed_at, completed_by, closure_notes, escalation_reason, escalated_at, escalated_by, escalated_to";

impl ExecutionRow {
    fn into_execution(self, completions: Vec<StepCompletion>) -> Result<ProtocolExecution, AppError> {
        let escalation = match (self.escalation_reason, self.escalated_at, self.escalated_by) {
            (Some(reason), Some(escalated_at), Some(escalated_by)) => Some(Escalation {
                reason,
                escalated_at,
                escalated_by,
                escalated_to: self.escalated_to,
            }),
            _ => None,
        };
        let closure = match (self.completed_at, self.completed_by) {
            (Some(completed_at), Some(completed_by)) => Some(Closure {
                completed_at,
                completed_by,
                notes: self.closure_notes,
            }),
            _ => None,
        };

        Ok(ProtocolExecution {
            id: self.id,
            organization_id: self.organization_id,
            alert_id: self.alert_id,
            template_id: self.template_id,
            status: self.status.parse()?,
            started_at: self.started_at,
            started_by: self.started_by,
            escalation,
            closure,
            completions,
        })
    }
}

async fn with_completions(
    conn: &mut PgConnection,
    rows: Vec<ExecutionRow>,
) -> Result<Vec<ProtocolExecution>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    let completion_rows = sqlx::query_as::<_, CompletionRow>(
        "SELECT execution_id, step_order, completed_at, completed_by, notes, evidence_ref \
         FROM protocol_step_completions \
         WHERE execution_id = ANY($1) \
         ORDER BY execution_id, step_order",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_execution: HashMap<i64, Vec<StepCompletion>> = HashMap::new();
    for row in completion_rows {
        by_execution.entry(row.execution_id).or_default().push(StepCompletion {
            step_order: row.step_order as u32,
            completed_at: row.completed_at,
            completed_by: row.completed_by,
            notes: row.notes,
            evidence_ref: row.evidence_ref,
        });
    }

    rows.into_iter()
        .map(|row| {
            let completions = by_execution.remove(&row.id).unwrap_or_default();
            row.into_execution(completions)
        })
        .collect()
}

pub async fn find_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<ProtocolExecution>, AppError> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM protocol_executions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_completions(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Id of the non-closed execution for an alert, if one exists.
pub async fn find_open_id_for_alert(conn: &mut PgConnection, alert_id: i64) -> Result<Option<i64>, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM protocol_executions WHERE alert_id = $1 AND status <> 'closed'",
    )
    .bind(alert_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.0))
}

/// All executions of an alert, oldest first.
pub async fn list_for_alert(conn: &mut PgConnection, alert_id: i64) -> Result<Vec<ProtocolExecution>, AppError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM protocol_executions WHERE alert_id = $1 ORDER BY started_at, id"
    ))
    .bind(alert_id)
    .fetch_all(&mut *conn)
    .await?;

    with_completions(conn, rows).await
}

/// Insert an in-progress execution. A second open execution for the same alert
/// violates `protocol_executions_one_open_per_alert`.
pub async fn insert(conn: &mut PgConnection, new: &NewExecution) -> Result<i64, sqlx::Error> {
    let id: (i64,) = sqlx::query_as(
        "INSERT INTO protocol_executions (organization_id, alert_id, template_id, status, started_at, started_by) \
         VALUES ($1, $2, $3, 'in_progress', $4, $5) RETURNING id",
    )
    .bind(new.organization_id)
    .bind(new.alert_id)
    .bind(new.template_id)
    .bind(new.started_at)
    .bind(new.started_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id.0)
}

pub async fn status_of(conn: &mut PgConnection, id: i64) -> Result<Option<ExecutionStatus>, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM protocol_executions WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| r.0.parse()).transpose()
}

/// Insert or replace a step completion, only while the execution is open.
/// Returns false when the execution is closed or missing.
pub async fn upsert_completion(
    conn: &mut PgConnection,
    execution_id: i64,
    completion: &StepCompletion,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "INSERT INTO protocol_step_completions \
             (execution_id, step_order, completed_at, completed_by, notes, evidence_ref) \
         SELECT $1, $2, $3, $4, $5, $6 \
         WHERE EXISTS (SELECT 1 FROM protocol_executions WHERE id = $1 AND status <> 'closed') \
         ON CONFLICT (execution_id, step_order) DO UPDATE \
         SET completed_at = EXCLUDED.completed_at, completed_by = EXCLUDED.completed_by, \
             notes = EXCLUDED.notes, evidence_ref = EXCLUDED.evidence_ref",
    )
    .bind(execution_id)
    .bind(completion.step_order as i32)
    .bind(completion.completed_at)
    .bind(completion.completed_by)
    .bind(&completion.notes)
    .bind(&completion.evidence_ref)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Mark an open execution escalated. Returns false when closed or missing.
pub async fn set_escalation(
    conn: &mut PgConnection,
    execution_id: i64,
    escalation: &Escalation,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE protocol_executions \
         SET status = 'escalated', escalation_reason = $2, escalated_at = $3, escalated_by = $4, escalated_to = $5 \
         WHERE id = $1 AND status <> 'closed'",
    )
    .bind(execution_id)
    .bind(&escalation.reason)
    .bind(escalation.escalated_at)
    .bind(escalation.escalated_by)
    .bind(&escalation.escalated_to)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Move an open execution to `closed`. Returns false when closed or missing.
pub async fn close(conn: &mut PgConnection, execution_id: i64, closure: &Closure) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE protocol_executions \
         SET status = 'closed', completed_at = $2, completed_by = $3, closure_notes = $4 \
         WHERE id = $1 AND status <> 'closed'",
    )
    .bind(execution_id)
    .bind(closure.completed_at)
    .bind(closure.completed_by)
    .bind(&closure.notes)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
