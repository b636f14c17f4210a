use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod assignment;
pub mod extend_request;
pub mod project;
pub mod report;
pub mod section;
pub mod status;
pub mod user;

/// Envelope returned by update and delete endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
