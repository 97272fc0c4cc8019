use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Kind of emergency an alert reports. Anything outside the fixed set is `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AlertType {
    Panic,
    Medical,
    Fire,
    SecurityBreach,
    General,
    Custom(String),
}

impl AlertType {
    /// The alert types the default catalog and `seed_defaults` know about.
    pub const KNOWN: [AlertType; 5] = [
        AlertType::Panic,
        AlertType::Medical,
        AlertType::Fire,
        AlertType::SecurityBreach,
        AlertType::General,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            AlertType::Panic => "panic",
            AlertType::Medical => "medical",
            AlertType::Fire => "fire",
            AlertType::SecurityBreach => "security_breach",
            AlertType::General => "general",
            AlertType::Custom(name) => name,
        }
    }
}

impl FromStr for AlertType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "panic" => AlertType::Panic,
            "medical" => AlertType::Medical,
            "fire" => AlertType::Fire,
            "security_breach" => AlertType::SecurityBreach,
            "general" => AlertType::General,
            "" => return Err(AppError::validation("alert_type", "must not be empty")),
            other => AlertType::Custom(other.to_string()),
        })
    }
}

impl TryFrom<String> for AlertType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlertType> for String {
    fn from(value: AlertType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert as seen by the protocol engine. Owned by the ingestion subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub organization_id: i64,
    pub alert_type: AlertType,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<i64>,
    pub resolution_notes: Option<String>,
}

/// Resolution written to the alert when its execution closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertResolution {
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: i64,
    pub resolution_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_custom_types() {
        assert_eq!("fire".parse::<AlertType>().unwrap(), AlertType::Fire);
        assert_eq!(
            "security_breach".parse::<AlertType>().unwrap(),
            AlertType::SecurityBreach
        );
        assert_eq!(
            "gas_leak".parse::<AlertType>().unwrap(),
            AlertType::Custom("gas_leak".to_string())
        );
        assert!("  ".parse::<AlertType>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&AlertType::SecurityBreach).unwrap();
        assert_eq!(json, "\"security_breach\"");
        let back: AlertType = serde_json::from_str("\"gas_leak\"").unwrap();
        assert_eq!(back.as_str(), "gas_leak");
    }
}
