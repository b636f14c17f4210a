use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::user::default_true;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_uid: Option<String>,
    #[schema(value_type = String, format = Date, example = "2024-01-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2024-03-31")]
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub contract_start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub contract_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Ordered section names.
    #[serde(default)]
    pub sections: Vec<String>,
    /// Attached document filenames.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateRequest {
    #[schema(example = "Riverside Tower, block B")]
    pub name: String,
    #[schema(example = "Kazan")]
    pub city: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub manager_uid: Option<String>,
    #[schema(example = "2024-01-01")]
    pub start_date: String,
    #[schema(example = "2024-03-31")]
    pub end_date: String,
    pub contract_start_date: Option<String>,
    pub contract_end_date: Option<String>,
    pub notes: Option<String>,
    pub active: Option<bool>,
    pub sections: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub manager_uid: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub contract_start_date: Option<String>,
    pub contract_end_date: Option<String>,
    pub notes: Option<String>,
    pub active: Option<bool>,
    pub sections: Option<Vec<String>>,
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    pub active: Option<bool>,
}
