use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use std::fmt;

/// A state precondition that did not hold. User-correctable, never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionFailed {
    ExecutionClosed { execution_id: i64 },
    RequiredStepsIncomplete { execution_id: i64, missing: Vec<u32> },
    EvidenceMissing { execution_id: i64, missing: Vec<u32> },
}

/// A uniqueness rule that a write would have broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    OpenExecutionExists { alert_id: i64, execution_id: i64 },
    ActiveTemplateExists { alert_type: String, template_id: i64 },
}

#[derive(Debug)]
pub enum AppError {
    Db(sqlx::Error),
    Validation { field: String, message: String },
    NotFound { entity: &'static str, id: i64 },
    NoActiveTemplate { organization_id: i64, alert_type: String },
    Precondition(PreconditionFailed),
    Conflict(ConflictKind),
    MissingActor,
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        AppError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. } | AppError::NoActiveTemplate { .. })
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, AppError::Precondition(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    /// Short machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Db(_) => "internal",
            AppError::Validation { .. } => "validation_failed",
            AppError::NotFound { .. } | AppError::NoActiveTemplate { .. } => "not_found",
            AppError::Precondition(PreconditionFailed::ExecutionClosed { .. }) => "execution_closed",
            AppError::Precondition(PreconditionFailed::RequiredStepsIncomplete { .. }) => {
                "required_steps_incomplete"
            }
            AppError::Precondition(PreconditionFailed::EvidenceMissing { .. }) => "evidence_missing",
            AppError::Conflict(ConflictKind::OpenExecutionExists { .. }) => "open_execution_exists",
            AppError::Conflict(ConflictKind::ActiveTemplateExists { .. }) => "active_template_exists",
            AppError::MissingActor => "missing_actor",
        }
    }
}

fn join_orders(orders: &[u32]) -> String {
    orders
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for PreconditionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionFailed::ExecutionClosed { execution_id } => {
                write!(f, "Execution {execution_id} is closed")
            }
            PreconditionFailed::RequiredStepsIncomplete { execution_id, missing } => write!(
                f,
                "Execution {execution_id} has incomplete required steps: {}",
                join_orders(missing)
            ),
            PreconditionFailed::EvidenceMissing { execution_id, missing } => write!(
                f,
                "Execution {execution_id} is missing photo evidence for steps: {}",
                join_orders(missing)
            ),
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::OpenExecutionExists { alert_id, execution_id } => write!(
                f,
                "Alert {alert_id} already has an open execution ({execution_id})"
            ),
            ConflictKind::ActiveTemplateExists { alert_type, template_id } => write!(
                f,
                "Template {template_id} is already active for alert type '{alert_type}'"
            ),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Validation { field, message } => write!(f, "Invalid {field}: {message}"),
            AppError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            AppError::NoActiveTemplate { organization_id, alert_type } => write!(
                f,
                "No active template for alert type '{alert_type}' in organization {organization_id}"
            ),
            AppError::Precondition(p) => write!(f, "Precondition failed: {p}"),
            AppError::Conflict(c) => write!(f, "Conflict: {c}"),
            AppError::MissingActor => write!(f, "Missing or invalid X-Actor-Id header"),
        }
    }
}

impl std::error::Error for AppError {}

/// API error response.
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<i64>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } | AppError::NoActiveTemplate { .. } => StatusCode::NOT_FOUND,
            AppError::Precondition(PreconditionFailed::ExecutionClosed { .. }) => StatusCode::CONFLICT,
            AppError::Precondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MissingActor => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Db(_) = self {
            log::error!("{self}");
            return HttpResponse::InternalServerError().json(ApiErrorResponse {
                error: "Internal Server Error".to_string(),
                code: self.code(),
                field: None,
                steps: None,
                existing_id: None,
            });
        }

        let (field, steps, existing_id) = match self {
            AppError::Validation { field, .. } => (Some(field.clone()), None, None),
            AppError::Precondition(PreconditionFailed::RequiredStepsIncomplete { missing, .. })
            | AppError::Precondition(PreconditionFailed::EvidenceMissing { missing, .. }) => {
                (None, Some(missing.clone()), None)
            }
            AppError::Conflict(ConflictKind::OpenExecutionExists { execution_id, .. }) => {
                (None, None, Some(*execution_id))
            }
            AppError::Conflict(ConflictKind::ActiveTemplateExists { template_id, .. }) => {
                (None, None, Some(*template_id))
            }
            _ => (None, None, None),
        };

        HttpResponse::build(self.status_code()).json(ApiErrorResponse {
            error: self.to_string(),
            code: self.code(),
            field,
            steps,
            existing_id,
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Db(e)
    }
}
