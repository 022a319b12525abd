//! Response contract of the daily maintenance trigger

use serde::{Deserialize, Serialize};

/// Successful sweep response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub success: bool,
    pub overdue_sessions_marked: u64,
    /// ISO-8601 timestamp of the sweep
    pub timestamp: String,
    #[serde(default)]
    pub sessions_materialized: u64,
    #[serde(default)]
    pub sessions_pruned: u64,
    /// Non-fatal phase failures and invariant alerts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Health endpoint body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_healthy: bool,
}
