use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::collections::HashMap;

use crate::errors::AppError;
use crate::models::alert::AlertType;
use super::types::*;

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    organization_id: i64,
    alert_type: String,
    name: String,
    name_localized: Option<String>,
    sla_minutes: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct StepRow {
    template_id: i64,
    step_order: i32,
    title: String,
    title_localized: Option<String>,
    description: Option<String>,
    description_localized: Option<String>,
    is_required: bool,
    photo_required: bool,
}

const TEMPLATE_COLUMNS: &str = "id, organization_id, alert_type, name, name_localized, sla_minutes, \
     is_active, created_at, updated_at, deleted_at";

/// Attach steps to template rows, preserving row order.
async fn with_steps(conn: &mut PgConnection, rows: Vec<TemplateRow>) -> Result<Vec<ProtocolTemplate>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    let step_rows = sqlx::query_as::<_, StepRow>(
        "SELECT template_id, step_order, title, title_localized, description, description_localized, \
                is_required, photo_required \
         FROM protocol_template_steps \
         WHERE template_id = ANY($1) \
         ORDER BY template_id, step_order",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut steps_by_template: HashMap<i64, Vec<ProtocolStep>> = HashMap::new();
    for row in step_rows {
        steps_by_template.entry(row.template_id).or_default().push(ProtocolStep {
            order: row.step_order as u32,
            title: row.title,
            title_localized: row.title_localized,
            description: row.description,
            description_localized: row.description_localized,
            is_required: row.is_required,
            photo_required: row.photo_required,
        });
    }

    rows.into_iter()
        .map(|row| {
            Ok(ProtocolTemplate {
                steps: steps_by_template.remove(&row.id).unwrap_or_default(),
                id: row.id,
                organization_id: row.organization_id,
                alert_type: row.alert_type.parse()?,
                name: row.name,
                name_localized: row.name_localized,
                sla_minutes: row.sla_minutes as u32,
                is_active: row.is_active,
                created_at: row.created_at,
                updated_at: row.updated_at,
                deleted_at: row.deleted_at,
            })
        })
        .collect()
}

/// Find a template by id, including soft-deleted ones.
pub async fn find_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<ProtocolTemplate>, AppError> {
    let row = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM protocol_templates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_steps(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Non-deleted templates of an organization, by alert type then newest first.
pub async fn list(
    conn: &mut PgConnection,
    organization_id: i64,
    alert_type: Option<&AlertType>,
) -> Result<Vec<ProtocolTemplate>, AppError> {
    let rows = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM protocol_templates \
         WHERE organization_id = $1 AND deleted_at IS NULL \
           AND ($2::TEXT IS NULL OR alert_type = $2) \
         ORDER BY alert_type, created_at DESC, id DESC"
    ))
    .bind(organization_id)
    .bind(alert_type.map(|t| t.as_str()))
    .fetch_all(&mut *conn)
    .await?;

    with_steps(conn, rows).await
}

/// The newest active, non-deleted template for an alert type.
pub async fn find_active(
    conn: &mut PgConnection,
    organization_id: i64,
    alert_type: &AlertType,
) -> Result<Option<ProtocolTemplate>, AppError> {
    let row = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM protocol_templates \
         WHERE organization_id = $1 AND alert_type = $2 AND is_active AND deleted_at IS NULL \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(organization_id)
    .bind(alert_type.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_steps(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Id of another active template of the same type, if any.
pub async fn find_other_active_id(
    conn: &mut PgConnection,
    organization_id: i64,
    alert_type: &AlertType,
    exclude_id: Option<i64>,
) -> Result<Option<i64>, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM protocol_templates \
         WHERE organization_id = $1 AND alert_type = $2 AND is_active AND deleted_at IS NULL \
           AND ($3::BIGINT IS NULL OR id <> $3) \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(organization_id)
    .bind(alert_type.as_str())
    .bind(exclude_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.0))
}

async fn insert_steps(conn: &mut PgConnection, template_id: i64, steps: &[ProtocolStep]) -> Result<(), AppError> {
    for step in steps {
        sqlx::query(
            "INSERT INTO protocol_template_steps \
                 (template_id, step_order, title, title_localized, description, description_localized, \
                  is_required, photo_required) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(template_id)
        .bind(step.order as i32)
        .bind(&step.title)
        .bind(&step.title_localized)
        .bind(&step.description)
        .bind(&step.description_localized)
        .bind(step.is_required)
        .bind(step.photo_required)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Insert a template and its steps. Returns the new id.
pub async fn insert(conn: &mut PgConnection, draft: &TemplateDraft) -> Result<i64, AppError> {
    let id: (i64,) = sqlx::query_as(
        "INSERT INTO protocol_templates \
             (organization_id, alert_type, name, name_localized, sla_minutes, is_active, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING id",
    )
    .bind(draft.organization_id)
    .bind(draft.alert_type.as_str())
    .bind(&draft.name)
    .bind(&draft.name_localized)
    .bind(draft.sla_minutes as i32)
    .bind(draft.is_active)
    .bind(draft.created_at)
    .fetch_one(&mut *conn)
    .await?;

    insert_steps(conn, id.0, &draft.steps).await?;
    Ok(id.0)
}

/// Overwrite a template row and replace its step list.
pub async fn update(conn: &mut PgConnection, template: &ProtocolTemplate) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE protocol_templates \
         SET alert_type = $2, name = $3, name_localized = $4, sla_minutes = $5, is_active = $6, updated_at = $7 \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(template.id)
    .bind(template.alert_type.as_str())
    .bind(&template.name)
    .bind(&template.name_localized)
    .bind(template.sla_minutes as i32)
    .bind(template.is_active)
    .bind(template.updated_at)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM protocol_template_steps WHERE template_id = $1")
        .bind(template.id)
        .execute(&mut *conn)
        .await?;
    insert_steps(conn, template.id, &template.steps).await?;
    Ok(true)
}

/// Set the soft-delete marker. Returns false when missing or already deleted.
pub async fn soft_delete(conn: &mut PgConnection, id: i64, now: DateTime<Utc>) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE protocol_templates SET deleted_at = $2, updated_at = $2 \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
