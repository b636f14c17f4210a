use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, to_document, DocumentStore, Query, WriteOp};
use crate::errors::{AppError, AppResult};
use crate::models::status::{default_statuses, Status, StatusCreateRequest, StatusUpdateRequest, DEFAULT_COLOR};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamped};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_statuses).post(create_status).options(health::preflight))
        .route(
            "/:id",
            get(get_status)
                .patch(update_status)
                .put(update_status)
                .delete(delete_status)
                .options(health::preflight),
        )
}

async fn load_ordered(store: &dyn DocumentStore) -> AppResult<Vec<Status>> {
    store
        .query(&Query::collection(collections::STATUSES).order_by("order"))
        .await?
        .into_iter()
        .map(|doc| doc.decode())
        .collect()
}

/// Writes the default statuses when the collection is empty. Returns how many were written.
pub async fn seed_defaults(store: &dyn DocumentStore) -> AppResult<usize> {
    if store.first(Query::collection(collections::STATUSES)).await?.is_some() {
        return Ok(0);
    }

    let ops = default_statuses()
        .iter()
        .enumerate()
        .map(|(idx, status)| {
            Ok(WriteOp::CreateIfAbsent {
                collection: collections::STATUSES.to_string(),
                id: format!("default-{}", idx + 1),
                data: to_document(status)?,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    store.commit(ops).await
}

#[utoipa::path(
    get,
    path = "/statuses",
    tag = "Statuses",
    responses((status = 200, description = "Statuses ordered by `order`", body = [Status]))
)]
pub async fn list_statuses(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Vec<Status>>> {
    principal.require_role(roles::ANY)?;
    Ok(Json(load_ordered(state.store.as_ref()).await?))
}

#[utoipa::path(
    get,
    path = "/statuses/{id}",
    tag = "Statuses",
    params(("id" = String, Path, description = "Status id")),
    responses(
        (status = 200, description = "Status", body = Status),
        (status = 404, description = "Status not found")
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Status>> {
    principal.require_role(roles::ANY)?;
    let status = fetch(state.store.as_ref(), collections::STATUSES, &id, "status").await?;
    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/statuses",
    tag = "Statuses",
    request_body = StatusCreateRequest,
    responses((status = 201, description = "Status created", body = Status))
)]
pub async fn create_status(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<StatusCreateRequest>,
) -> AppResult<(StatusCode, Json<Status>)> {
    principal.require_role(roles::PRIVILEGED)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let order = match payload.order {
        Some(order) => order,
        None => {
            let existing = load_ordered(state.store.as_ref()).await?;
            existing.iter().map(|status| status.order).max().unwrap_or(0) + 1
        }
    };

    let mut status = Status {
        id: String::new(),
        name: payload.name,
        color: payload.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        order,
        active: payload.active.unwrap_or(true),
    };

    status.id = state.store.add(collections::STATUSES, to_document(&status)?).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

#[utoipa::path(
    patch,
    path = "/statuses/{id}",
    tag = "Statuses",
    params(("id" = String, Path, description = "Status id")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status updated", body = OkResponse),
        (status = 404, description = "Status not found")
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;
    apply_patch(state.store.as_ref(), collections::STATUSES, &id, stamped(&payload)?, "status").await?;
    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/statuses/{id}",
    tag = "Statuses",
    params(("id" = String, Path, description = "Status id")),
    responses((status = 200, description = "Status deleted (or already absent)", body = OkResponse))
)]
pub async fn delete_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::ADMIN)?;
    state.store.delete(collections::STATUSES, &id).await?;
    Ok(Json(OkResponse::ok()))
}
