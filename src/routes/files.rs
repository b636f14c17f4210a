use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, Document};
use crate::errors::{AppError, AppResult};
use crate::models::project::Project;
use crate::routes::{apply_patch, fetch, health, stamp};
use crate::storage::{object_key, MAX_UPLOAD_BYTES};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file).options(health::preflight))
        // multipart framing on top of the file itself
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
}

/// Multipart form accepted by the upload endpoint.
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    project_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileUploadResponse {
    pub url: String,
    pub name: String,
}

struct Upload {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/files/upload",
    tag = "Files",
    request_body(content = FileUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = FileUploadResponse),
        (status = 400, description = "Missing file or file too large"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    principal: Principal,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileUploadResponse>)> {
    principal.require_role(roles::PRIVILEGED)?;

    let mut upload = None;
    let mut project_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("file").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("failed to read file: {err}")))?;
                upload = Some(Upload {
                    name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("projectId") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid projectId: {err}")))?;
                project_id = Some(value.trim().to_string()).filter(|id| !id.is_empty());
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::bad_request("file exceeds the upload size limit"));
    }

    let project = match project_id.as_deref() {
        Some(id) => Some(fetch::<Project>(state.store.as_ref(), collections::PROJECTS, id, "project").await?),
        None => None,
    };

    let key = object_key(&upload.name);
    let url = state.storage.put(&key, upload.bytes, &upload.content_type).await?;

    if let (Some(id), Some(project)) = (project_id.as_deref(), project) {
        let mut files = project.files;
        files.push(upload.name.clone());

        let mut patch = Document::new();
        patch.insert("files".into(), json!(files));
        stamp(&mut patch);
        apply_patch(state.store.as_ref(), collections::PROJECTS, id, patch, "project").await?;
    }

    tracing::info!(key = %key, project_id = project_id.as_deref().unwrap_or(""), by = %principal.uid, "file uploaded");

    Ok((StatusCode::CREATED, Json(FileUploadResponse { url, name: upload.name })))
}
