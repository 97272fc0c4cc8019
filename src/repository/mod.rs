//! Persistence seam for the protocol engine.
//!
//! Every method is a single atomic unit: implementations must not expose
//! partially applied writes, and the conditional writes (completion,
//! escalation, closure) re-check the execution state at write time.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::alert::{Alert, AlertResolution, AlertType};
use crate::models::execution::{Closure, Escalation, NewExecution, ProtocolExecution, StepCompletion};
use crate::models::template::{ProtocolTemplate, TemplateDraft};

#[allow(async_fn_in_trait)]
pub trait ProtocolRepository {
    /// Non-deleted templates, ordered by alert type then newest first.
    async fn list_templates(
        &self,
        organization_id: i64,
        alert_type: Option<&AlertType>,
    ) -> Result<Vec<ProtocolTemplate>, AppError>;

    /// Lookup by id, including soft-deleted templates.
    async fn find_template(&self, id: i64) -> Result<Option<ProtocolTemplate>, AppError>;

    async fn find_active_template(
        &self,
        organization_id: i64,
        alert_type: &AlertType,
    ) -> Result<Option<ProtocolTemplate>, AppError>;

    /// Insert all drafts or none. An active draft whose type already has a live
    /// active template fails with `ConflictKind::ActiveTemplateExists`.
    async fn insert_templates(&self, drafts: &[TemplateDraft]) -> Result<Vec<ProtocolTemplate>, AppError>;

    /// Overwrite a live template (including its step list).
    async fn update_template(&self, template: &ProtocolTemplate) -> Result<(), AppError>;

    async fn soft_delete_template(&self, id: i64, now: DateTime<Utc>) -> Result<(), AppError>;

    async fn find_alert(&self, id: i64) -> Result<Option<Alert>, AppError>;

    /// Create an in-progress execution. Fails with `ConflictKind::OpenExecutionExists`
    /// when the alert already has a non-closed execution.
    async fn insert_execution(&self, new: &NewExecution) -> Result<ProtocolExecution, AppError>;

    async fn find_execution(&self, id: i64) -> Result<Option<ProtocolExecution>, AppError>;

    async fn list_executions_for_alert(&self, alert_id: i64) -> Result<Vec<ProtocolExecution>, AppError>;

    /// Insert or replace the completion for its step order.
    async fn upsert_completion(&self, execution_id: i64, completion: &StepCompletion) -> Result<(), AppError>;

    async fn escalate(&self, execution_id: i64, escalation: &Escalation) -> Result<(), AppError>;

    /// Close the execution and resolve its alert in one transaction.
    async fn close_and_resolve(
        &self,
        execution_id: i64,
        alert_id: i64,
        closure: &Closure,
        resolution: &AlertResolution,
    ) -> Result<(), AppError>;
}
