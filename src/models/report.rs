use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    #[schema(example = "2024-01-01")]
    pub date_from: String,
    #[schema(example = "2024-01-31")]
    pub date_to: String,
    pub worker_id: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLoadEntry {
    pub worker_id: String,
    pub name: String,
    pub count: u64,
}

/// Assignment counts per lifecycle state. Keys mirror the state wire names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectStatusSummary {
    pub in_progress: u64,
    pub done_pending: u64,
    pub done_approved: u64,
    pub extend_requested: u64,
}
