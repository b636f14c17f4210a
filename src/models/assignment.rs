use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::{IntoParams, ToSchema};

/// Lifecycle of a single assignment day.
///
/// ```text
/// in_progress ──(crew marks done)──────────▶ done_pending ──(approve)──▶ done_approved
///      │
///      └──(crew requests extension)──▶ extend_requested ──(extension approved)──▶ in_progress
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    #[default]
    InProgress,
    DonePending,
    DoneApproved,
    ExtendRequested,
}

impl AssignmentState {
    pub const ALL: [AssignmentState; 4] = [
        AssignmentState::InProgress,
        AssignmentState::DonePending,
        AssignmentState::DoneApproved,
        AssignmentState::ExtendRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::InProgress => "in_progress",
            AssignmentState::DonePending => "done_pending",
            AssignmentState::DoneApproved => "done_approved",
            AssignmentState::ExtendRequested => "extend_requested",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == raw)
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One day's work cell. `statusName`, `sectionName` and `workerNames` are copies taken at
/// creation time and are not refreshed when the referenced documents are renamed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default)]
    pub id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[schema(value_type = String, format = Date, example = "2024-01-01")]
    pub date_start: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2024-01-03")]
    pub date_end: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2024-01-02")]
    pub day: NaiveDate,
    /// Emails of the assigned crew.
    #[serde(default)]
    pub worker_ids: Vec<String>,
    #[serde(default)]
    pub worker_names: Vec<String>,
    #[serde(default)]
    pub state: AssignmentState,
    #[serde(default)]
    pub comments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Whether `identifier` (email or uid) is on the crew list, compared case-insensitively.
    pub fn is_assigned(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        !identifier.is_empty()
            && self
                .worker_ids
                .iter()
                .any(|worker| worker.trim().eq_ignore_ascii_case(identifier))
    }
}

/// Longest range a single create may expand, in days.
pub const MAX_PLAN_DAYS: i64 = 366;

/// Deterministic key for the (project, section, day) cell so concurrent creates of the same
/// cell collapse into one document.
pub fn cell_key(project_id: &str, section_id: Option<&str>, day: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(section_id.unwrap_or_default().as_bytes());
    hasher.update([0x1f]);
    hasher.update(day.format("%Y-%m-%d").to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentCreateRequest {
    pub project_id: String,
    pub status_id: Option<String>,
    pub status_name: Option<String>,
    pub section_id: Option<String>,
    pub section_name: Option<String>,
    #[schema(example = "2024-01-01")]
    pub date_start: String,
    #[schema(example = "2024-01-03")]
    pub date_end: String,
    #[serde(default)]
    pub worker_ids: Vec<String>,
    pub worker_names: Option<Vec<String>>,
    pub comments: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignmentCreateResponse {
    /// Number of day records actually written.
    pub created: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignmentUpdateResponse {
    pub ok: bool,
    /// Key of the record after the update. It changes when the record moves to another
    /// (project, section, day) cell.
    pub id: String,
}

/// Partial update. Which keys a caller may send is decided by the field policy for its role.
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub day: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<AssignmentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AssignmentListQuery {
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    /// Email of a crew member on the assignment.
    pub worker_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendAssignmentRequest {
    #[serde(default)]
    pub reason: String,
    /// Defaults to 1.
    pub extra_days: Option<i64>,
}
