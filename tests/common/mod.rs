//! Shared test infrastructure for engine and API tests.
//!
//! Every test gets its own in-memory repository and a manual clock pinned to
//! [`t0`], so timestamps and SLA checks are deterministic.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use safeops::clock::{Clock, ManualClock};
use safeops::config::ProtocolConfig;
use safeops::models::alert::AlertType;
use safeops::models::template::{NewTemplate, ProtocolTemplate, StepInput};
use safeops::protocol::ProtocolService;
use safeops::repository::MemoryRepository;

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const ORG_ID: i64 = 1;
pub const OTHER_ORG_ID: i64 = 2;
pub const RESPONDER: i64 = 42;
pub const SUPERVISOR: i64 = 7;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 14, 0, 0).unwrap()
}

// ============================================================================
// ENGINE SETUP
// ============================================================================

pub struct TestEngine {
    pub service: ProtocolService<MemoryRepository>,
    pub repo: MemoryRepository,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    /// Register an alert for [`ORG_ID`] at the current clock time.
    pub async fn alert(&self, alert_type: AlertType) -> i64 {
        self.repo.insert_alert(ORG_ID, alert_type, self.clock.now()).await
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// "Panic Response": required 1, 2 and 4 (4 needs a photo), optional 3; SLA 5 minutes.
    pub async fn panic_template(&self) -> ProtocolTemplate {
        self.service
            .create_template(
                ORG_ID,
                NewTemplate {
                    alert_type: AlertType::Panic,
                    name: "Panic Response".to_string(),
                    name_localized: None,
                    steps: vec![
                        step("Locate person", true, false),
                        step("Assess danger", true, false),
                        step("Request backup", false, false),
                        step("Document", true, true),
                    ],
                    sla_minutes: 5,
                    is_active: true,
                },
                SUPERVISOR,
            )
            .await
            .expect("create panic template")
    }
}

pub fn setup_engine() -> TestEngine {
    setup_engine_with(ProtocolConfig::default())
}

pub fn setup_engine_with(config: ProtocolConfig) -> TestEngine {
    let repo = MemoryRepository::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let service = ProtocolService::new(repo.clone(), clock.clone(), config);
    TestEngine { service, repo, clock }
}

// ============================================================================
// INPUT BUILDERS
// ============================================================================

pub fn step(title: &str, is_required: bool, photo_required: bool) -> StepInput {
    StepInput {
        title: title.to_string(),
        is_required,
        photo_required,
        ..StepInput::default()
    }
}

pub fn new_template(alert_type: AlertType, name: &str, steps: Vec<StepInput>) -> NewTemplate {
    NewTemplate {
        alert_type,
        name: name.to_string(),
        name_localized: None,
        steps,
        sla_minutes: 10,
        is_active: true,
    }
}
