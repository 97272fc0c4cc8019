use serde::{Deserialize, Serialize};

use crate::models::execution::ProtocolExecution;
use crate::models::template::ProtocolStep;
use crate::protocol::{ClosureEligibility, SlaStatus};

/// Paginated list response.
#[derive(Serialize, Debug)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T: Serialize> PaginatedResponse<T> {
    /// Slice an already ordered list. `page` starts at 1; `per_page` is capped at 100.
    pub fn paginate(all: Vec<T>, page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(25).clamp(1, 100);
        let total = all.len() as i64;
        let offset = usize::try_from(page.saturating_sub(1).saturating_mul(per_page)).unwrap_or(usize::MAX);
        let items = all.into_iter().skip(offset).take(per_page as usize).collect();
        PaginatedResponse { items, page, per_page, total }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct TemplateListQuery {
    pub alert_type: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct StartExecutionRequest {
    #[serde(default)]
    pub template_id: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CompleteStepRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub evidence_ref: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct EscalateRequest {
    pub reason: String,
    #[serde(default)]
    pub escalate_to: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CloseRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Everything a responder screen needs for one execution.
#[derive(Serialize, Debug)]
pub struct ExecutionDetail {
    #[serde(flatten)]
    pub execution: ProtocolExecution,
    pub steps: Vec<ProtocolStep>,
    pub closure_eligibility: ClosureEligibility,
    pub sla: SlaStatus,
}
