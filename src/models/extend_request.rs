use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const MIN_EXTRA_DAYS: i64 = 1;
pub const MAX_EXTRA_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Open,
    Approved,
    Rejected,
}

/// A crew member asking for more days on an assignment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    #[serde(default)]
    pub id: String,
    pub assignment_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub reason: String,
    #[schema(minimum = 1, maximum = 30)]
    pub extra_days: i64,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestListQuery {
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtendCreatedResponse {
    pub id: String,
    pub ok: bool,
}
