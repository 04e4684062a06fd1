//! Job execution stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time view of one job's execution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub id: Uuid,
    pub name: String,
    pub error: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub tags: Vec<String>,
}

impl JobStats {
    /// Serialize to a single-line JSON string for reporting.
    pub fn marshal(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
