use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::default_true;

pub const DEFAULT_COLOR: &str = "#9e9e9e";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub id: String,
    #[schema(example = "Cable laying")]
    pub name: String,
    #[serde(default = "default_color")]
    #[schema(example = "#2196f3")]
    pub color: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCreateRequest {
    pub name: String,
    pub color: Option<String>,
    pub order: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Reference rows written by `crew-planner-cli seed-statuses` into an empty collection.
pub fn default_statuses() -> Vec<Status> {
    [
        ("Planned", "#9e9e9e"),
        ("In progress", "#2196f3"),
        ("Waiting for materials", "#ff9800"),
        ("Completed", "#4caf50"),
    ]
    .into_iter()
    .enumerate()
    .map(|(idx, (name, color))| Status {
        id: String::new(),
        name: name.to_string(),
        color: color.to_string(),
        order: idx as i64 + 1,
        active: true,
    })
    .collect()
}
