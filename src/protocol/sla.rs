use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::execution::ProtocolExecution;
use crate::models::template::ProtocolTemplate;
use crate::repository::ProtocolRepository;
use super::ProtocolService;

/// SLA of an execution: its template's target, or the configured default.
pub fn sla_minutes(template: Option<&ProtocolTemplate>, default_sla_minutes: u32) -> u32 {
    template.map_or(default_sla_minutes, |t| t.sla_minutes)
}

pub fn deadline(execution: &ProtocolExecution, sla_minutes: u32) -> DateTime<Utc> {
    execution.started_at + Duration::minutes(i64::from(sla_minutes))
}

/// Overdue means still open and strictly past the deadline. Closed executions are never overdue.
pub fn is_overdue(
    execution: &ProtocolExecution,
    template: Option<&ProtocolTemplate>,
    default_sla_minutes: u32,
    now: DateTime<Utc>,
) -> bool {
    !execution.status.is_closed() && now > deadline(execution, sla_minutes(template, default_sla_minutes))
}

/// Derived SLA view. Recomputed on every read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlaStatus {
    pub execution_id: i64,
    pub sla_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub overdue: bool,
    /// Seconds left until the deadline; negative once past it. None when closed.
    pub seconds_remaining: Option<i64>,
}

impl<R: ProtocolRepository> ProtocolService<R> {
    pub async fn sla_status(&self, execution_id: i64) -> Result<SlaStatus, AppError> {
        let execution = self.get_execution(execution_id).await?;
        let template = self.execution_template(&execution).await?;
        let now = self.now();

        let minutes = sla_minutes(template.as_ref(), self.config.default_sla_minutes);
        let deadline = deadline(&execution, minutes);
        Ok(SlaStatus {
            execution_id,
            sla_minutes: minutes,
            started_at: execution.started_at,
            deadline,
            overdue: is_overdue(&execution, template.as_ref(), self.config.default_sla_minutes, now),
            seconds_remaining: (!execution.status.is_closed()).then(|| (deadline - now).num_seconds()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::execution::{Closure, ExecutionStatus};
    use chrono::TimeZone;

    fn execution(started_at: DateTime<Utc>) -> ProtocolExecution {
        ProtocolExecution {
            id: 9,
            organization_id: 1,
            alert_id: 2,
            template_id: None,
            status: ExecutionStatus::InProgress,
            started_at,
            started_by: 4,
            escalation: None,
            closure: None,
            completions: Vec::new(),
        }
    }

    #[test]
    fn overdue_only_strictly_after_deadline() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap();
        let exec = execution(t0);
        assert!(!is_overdue(&exec, None, 10, t0));
        assert!(!is_overdue(&exec, None, 10, t0 + Duration::minutes(10)));
        assert!(is_overdue(&exec, None, 10, t0 + Duration::minutes(10) + Duration::seconds(1)));
    }

    #[test]
    fn closed_execution_is_never_overdue() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap();
        let mut exec = execution(t0);
        exec.status = ExecutionStatus::Closed;
        exec.closure = Some(Closure {
            completed_at: t0 + Duration::hours(5),
            completed_by: 4,
            notes: None,
        });
        assert!(!is_overdue(&exec, None, 10, t0 + Duration::days(30)));
    }

    #[test]
    fn escalated_execution_can_be_overdue() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap();
        let mut exec = execution(t0);
        exec.status = ExecutionStatus::Escalated;
        assert!(is_overdue(&exec, None, 1, t0 + Duration::minutes(2)));
    }
}
