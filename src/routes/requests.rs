use axum::extract::{Path, Query as QueryParams, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, Document, Query, WriteOp};
use crate::errors::{AppError, AppResult};
use crate::events::{emit, Notification, NotificationKind};
use crate::models::assignment::{Assignment, AssignmentState};
use crate::models::extend_request::{ExtendRequest, RequestListQuery, RequestStatus};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamp};
use crate::utils::{add_days, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).options(health::preflight))
        .route("/:id/approve", post(approve_request).options(health::preflight))
        .route("/:id/reject", post(reject_request).options(health::preflight))
}

async fn load_open(state: &AppState, id: &str) -> AppResult<ExtendRequest> {
    let request: ExtendRequest = fetch(state.store.as_ref(), collections::REQUESTS, id, "request").await?;

    if request.status != RequestStatus::Open {
        return Err(AppError::conflict(format!(
            "request is already {}",
            json!(request.status).as_str().unwrap_or("resolved")
        )));
    }

    Ok(request)
}

fn resolution(status: RequestStatus, principal: &Principal) -> Document {
    let mut patch = Document::new();
    patch.insert("status".into(), json!(status));
    patch.insert("resolvedBy".into(), json!(principal.uid));
    patch.insert("resolvedAt".into(), json!(utc_now()));
    patch
}

#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    params(RequestListQuery),
    responses((status = 200, description = "Extension requests", body = [ExtendRequest]))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(params): QueryParams<RequestListQuery>,
) -> AppResult<Json<Vec<ExtendRequest>>> {
    principal.require_role(roles::ANY)?;

    let mut query = Query::collection(collections::REQUESTS);
    if let Some(status) = params.status {
        query = query.where_eq("status", json!(status));
    }

    let requests = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .map(|doc| doc.decode())
        .collect::<AppResult<Vec<ExtendRequest>>>()?;

    Ok(Json(requests))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/approve",
    tag = "Requests",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Extension granted", body = OkResponse),
        (status = 404, description = "Request or assignment not found"),
        (status = 409, description = "Request already resolved")
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;

    let request = load_open(&state, &id).await?;
    let assignment: Assignment = fetch(
        state.store.as_ref(),
        collections::ASSIGNMENTS,
        &request.assignment_id,
        "assignment",
    )
    .await?;

    let extra_days = u32::try_from(request.extra_days)
        .map_err(|_| AppError::bad_request(format!("extraDays {} is out of range", request.extra_days)))?;
    let new_end = add_days(assignment.date_end, extra_days)?;

    let mut assignment_patch = Document::new();
    assignment_patch.insert("dateEnd".into(), json!(new_end));
    assignment_patch.insert("state".into(), json!(AssignmentState::InProgress));
    stamp(&mut assignment_patch);

    state
        .store
        .commit(vec![
            WriteOp::Update {
                collection: collections::ASSIGNMENTS.to_string(),
                id: request.assignment_id.clone(),
                patch: assignment_patch,
            },
            WriteOp::Update {
                collection: collections::REQUESTS.to_string(),
                id: id.clone(),
                patch: resolution(RequestStatus::Approved, &principal),
            },
        ])
        .await?;

    tracing::info!(
        request_id = %id,
        assignment_id = %request.assignment_id,
        date_end = %new_end,
        by = %principal.uid,
        "extension approved"
    );
    emit(
        &state.events,
        Notification::new(NotificationKind::ExtendApproved, request.assignment_id)
            .with_request(id)
            .with_actor(principal.uid.as_str()),
    );

    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/reject",
    tag = "Requests",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Extension refused", body = OkResponse),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already resolved")
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;

    load_open(&state, &id).await?;
    apply_patch(
        state.store.as_ref(),
        collections::REQUESTS,
        &id,
        resolution(RequestStatus::Rejected, &principal),
        "request",
    )
    .await?;
    tracing::info!(request_id = %id, by = %principal.uid, "extension rejected");

    Ok(Json(OkResponse::ok()))
}
