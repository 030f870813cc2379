//! Dealer-facing notifications.

use crate::domain::{TimeMs, UnknownVariant};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(UnknownVariant::new("severity", other)),
        }
    }
}

/// Side-effect record. Only the `read` flag ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub dealer_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub read: bool,
    pub timestamp: TimeMs,
}

impl Notification {
    pub fn new(
        dealer_id: &str,
        kind: &str,
        title: &str,
        message: String,
        severity: Severity,
        now: TimeMs,
    ) -> Self {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            dealer_id: dealer_id.to_string(),
            kind: kind.to_string(),
            title: title.to_string(),
            message,
            severity,
            read: false,
            timestamp: now,
        }
    }
}
