use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::errors::AppError;
use super::types::*;

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    organization_id: i64,
    alert_type: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<i64>,
    resolution_notes: Option<String>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = AppError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            organization_id: row.organization_id,
            alert_type: row.alert_type.parse()?,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_notes: row.resolution_notes,
        })
    }
}

pub async fn find_by_id<'e>(exec: impl PgExecutor<'e>, id: i64) -> Result<Option<Alert>, AppError> {
    let row = sqlx::query_as::<_, AlertRow>(
        "SELECT id, organization_id, alert_type, created_at, resolved_at, resolved_by, resolution_notes \
         FROM alerts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    row.map(Alert::try_from).transpose()
}

/// Insert an alert. Normally done by the ingestion subsystem; used for seeding and tests.
pub async fn create<'e>(
    exec: impl PgExecutor<'e>,
    organization_id: i64,
    alert_type: &AlertType,
    created_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    let id: (i64,) = sqlx::query_as(
        "INSERT INTO alerts (organization_id, alert_type, created_at) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(organization_id)
    .bind(alert_type.as_str())
    .bind(created_at)
    .fetch_one(exec)
    .await?;
    Ok(id.0)
}

/// Mark an alert resolved. Returns false when the alert does not exist.
pub async fn resolve<'e>(
    exec: impl PgExecutor<'e>,
    id: i64,
    resolution: &AlertResolution,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE alerts SET resolved_at = $2, resolved_by = $3, resolution_notes = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(resolution.resolved_at)
    .bind(resolution.resolved_by)
    .bind(&resolution.resolution_notes)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}
