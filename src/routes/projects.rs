use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, to_document, Document, Query};
use crate::errors::{AppError, AppResult};
use crate::models::project::{Project, ProjectCreateRequest, ProjectListQuery, ProjectUpdateRequest};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamp};
use crate::utils::{parse_date, parse_range, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project).options(health::preflight))
        .route(
            "/:id",
            get(get_project)
                .patch(update_project)
                .put(update_project)
                .delete(delete_project)
                .options(health::preflight),
        )
}

fn parse_optional(field: &str, raw: Option<&str>) -> AppResult<Option<NaiveDate>> {
    raw.map(|raw| parse_date(field, raw)).transpose()
}

fn ensure_ordered(
    start_field: &str,
    start: Option<NaiveDate>,
    end_field: &str,
    end: Option<NaiveDate>,
) -> AppResult<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            Err(AppError::bad_request(format!("{end_field} must be >= {start_field}")))
        }
        _ => Ok(()),
    }
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    params(ProjectListQuery),
    responses((status = 200, description = "List projects", body = [Project]))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(params): QueryParams<ProjectListQuery>,
) -> AppResult<Json<Vec<Project>>> {
    principal.require_role(roles::ANY)?;

    let mut query = Query::collection(collections::PROJECTS);
    if let Some(active) = params.active {
        query = query.where_eq("active", active);
    }

    let projects = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .map(|doc| doc.decode())
        .collect::<AppResult<Vec<Project>>>()?;

    Ok(Json(projects))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Project>> {
    principal.require_role(roles::ANY)?;
    let project = fetch(state.store.as_ref(), collections::PROJECTS, &id, "project").await?;
    Ok(Json(project))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Malformed dates or end before start")
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    principal.require_role(roles::PRIVILEGED)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let (start_date, end_date) = parse_range("startDate", &payload.start_date, "endDate", &payload.end_date)?;
    let contract_start_date = parse_optional("contractStartDate", payload.contract_start_date.as_deref())?;
    let contract_end_date = parse_optional("contractEndDate", payload.contract_end_date.as_deref())?;
    ensure_ordered("contractStartDate", contract_start_date, "contractEndDate", contract_end_date)?;

    let active = payload.active.unwrap_or(true);
    let now = utc_now();

    let mut project = Project {
        id: String::new(),
        name: payload.name,
        city: payload.city,
        address: payload.address,
        description: payload.description.unwrap_or_default(),
        manager_uid: payload.manager_uid,
        start_date,
        end_date,
        contract_start_date,
        contract_end_date,
        notes: payload.notes.unwrap_or_default(),
        active,
        sections: payload.sections.unwrap_or_default(),
        files: Vec::new(),
        archived_at: (!active).then_some(now),
        created_at: Some(now),
        updated_at: None,
    };

    project.id = state
        .store
        .add(collections::PROJECTS, to_document(&project)?)
        .await?;
    tracing::info!(project_id = %project.id, by = %principal.uid, "project created");

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = String, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = OkResponse),
        (status = 400, description = "Malformed dates or end before start"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn update_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;

    let current: Project = fetch(state.store.as_ref(), collections::PROJECTS, &id, "project").await?;
    let mut patch = Document::new();

    let start_date = parse_optional("startDate", payload.start_date.as_deref())?;
    let end_date = parse_optional("endDate", payload.end_date.as_deref())?;
    ensure_ordered(
        "startDate",
        Some(start_date.unwrap_or(current.start_date)),
        "endDate",
        Some(end_date.unwrap_or(current.end_date)),
    )?;

    let contract_start_date = parse_optional("contractStartDate", payload.contract_start_date.as_deref())?;
    let contract_end_date = parse_optional("contractEndDate", payload.contract_end_date.as_deref())?;
    ensure_ordered(
        "contractStartDate",
        contract_start_date.or(current.contract_start_date),
        "contractEndDate",
        contract_end_date.or(current.contract_end_date),
    )?;

    let dates = [
        ("startDate", start_date),
        ("endDate", end_date),
        ("contractStartDate", contract_start_date),
        ("contractEndDate", contract_end_date),
    ];
    for (field, date) in dates {
        if let Some(date) = date {
            patch.insert(field.into(), json!(date));
        }
    }

    let texts = [
        ("name", payload.name),
        ("city", payload.city),
        ("address", payload.address),
        ("description", payload.description),
        ("managerUid", payload.manager_uid),
        ("notes", payload.notes),
    ];
    for (field, value) in texts {
        if let Some(value) = value {
            patch.insert(field.into(), Value::String(value));
        }
    }

    if let Some(sections) = payload.sections {
        patch.insert("sections".into(), json!(sections));
    }
    if let Some(files) = payload.files {
        patch.insert("files".into(), json!(files));
    }

    if let Some(active) = payload.active {
        patch.insert("active".into(), Value::Bool(active));
        // null removes the key on merge
        let archived_at = if active { Value::Null } else { json!(utc_now()) };
        patch.insert("archivedAt".into(), archived_at);
    }

    stamp(&mut patch);
    apply_patch(state.store.as_ref(), collections::PROJECTS, &id, patch, "project").await?;

    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = String, Path, description = "Project id")),
    responses((status = 200, description = "Project deleted (or already absent)", body = OkResponse))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::ADMIN)?;

    if state.store.delete(collections::PROJECTS, &id).await? {
        tracing::info!(project_id = %id, by = %principal.uid, "project deleted");
    }

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> Option<NaiveDate> {
        Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap())
    }

    #[test]
    fn ordering_check_ignores_missing_bounds() {
        assert!(ensure_ordered("a", None, "b", date("2024-01-01")).is_ok());
        assert!(ensure_ordered("a", date("2024-01-02"), "b", date("2024-01-02")).is_ok());
        assert!(ensure_ordered("a", date("2024-01-03"), "b", date("2024-01-02")).is_err());
    }
}
