//! Emergency protocol engine: templates, executions, escalation, closure and SLA.
//!
//! Every operation is a method on [`ProtocolService`]; each submodule adds the
//! methods of one component.

pub mod catalog;
pub mod closure;
pub mod engine;
pub mod escalation;
pub mod sla;
pub mod templates;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::ProtocolConfig;
use crate::repository::ProtocolRepository;

pub use closure::ClosureEligibility;
pub use engine::{all_required_steps_complete, is_step_completed, missing_required_steps};
pub use sla::{SlaStatus, is_overdue};

pub struct ProtocolService<R> {
    repo: R,
    clock: Arc<dyn Clock>,
    config: ProtocolConfig,
}

impl<R: ProtocolRepository> ProtocolService<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>, config: ProtocolConfig) -> Self {
        Self { repo, clock, config }
    }

    pub fn with_system_clock(repo: R, config: ProtocolConfig) -> Self {
        Self::new(repo, Arc::new(SystemClock), config)
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Trim an optional text field, mapping blank input to `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
