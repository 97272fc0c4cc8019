use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::alert::AlertType;

/// One checklist entry of a protocol template. `order` runs 1..N within its template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub order: u32,
    pub title: String,
    pub title_localized: Option<String>,
    pub description: Option<String>,
    pub description_localized: Option<String>,
    pub is_required: bool,
    pub photo_required: bool,
}

/// A configured response checklist for one alert type within an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolTemplate {
    pub id: i64,
    pub organization_id: i64,
    pub alert_type: AlertType,
    pub name: String,
    pub name_localized: Option<String>,
    pub steps: Vec<ProtocolStep>,
    pub sla_minutes: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ProtocolTemplate {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Step as submitted by an author. Any `order` value is ignored; position decides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepInput {
    #[serde(default)]
    pub order: Option<u32>,
    pub title: String,
    #[serde(default)]
    pub title_localized: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub description_localized: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub photo_required: bool,
}

/// Input for creating a template.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub alert_type: AlertType,
    pub name: String,
    #[serde(default)]
    pub name_localized: Option<String>,
    pub steps: Vec<StepInput>,
    pub sla_minutes: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update. `steps`, when present, replaces the whole list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateUpdate {
    #[serde(default)]
    pub alert_type: Option<AlertType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_localized: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<StepInput>>,
    #[serde(default)]
    pub sla_minutes: Option<u32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// A validated template ready to be persisted; ids and timestamps are assigned on insert.
#[derive(Debug, Clone)]
pub struct TemplateDraft {
    pub organization_id: i64,
    pub alert_type: AlertType,
    pub name: String,
    pub name_localized: Option<String>,
    pub steps: Vec<ProtocolStep>,
    pub sla_minutes: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
