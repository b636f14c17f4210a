use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, to_document, Query};
use crate::errors::{AppError, AppResult};
use crate::models::section::{Section, SectionCreateRequest, SectionListQuery, SectionUpdateRequest};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamped};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sections).post(create_section).options(health::preflight))
        .route(
            "/:id",
            get(get_section)
                .patch(update_section)
                .put(update_section)
                .delete(delete_section)
                .options(health::preflight),
        )
}

#[utoipa::path(
    get,
    path = "/sections",
    tag = "Sections",
    params(SectionListQuery),
    responses((status = 200, description = "Sections ordered by `order`", body = [Section]))
)]
pub async fn list_sections(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(params): QueryParams<SectionListQuery>,
) -> AppResult<Json<Vec<Section>>> {
    principal.require_role(roles::ANY)?;

    let mut query = Query::collection(collections::SECTIONS).order_by("order");
    if let Some(active) = params.active {
        query = query.where_eq("active", active);
    }

    let sections = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .map(|doc| doc.decode())
        .collect::<AppResult<Vec<Section>>>()?;

    Ok(Json(sections))
}

#[utoipa::path(
    get,
    path = "/sections/{id}",
    tag = "Sections",
    params(("id" = String, Path, description = "Section id")),
    responses(
        (status = 200, description = "Section", body = Section),
        (status = 404, description = "Section not found")
    )
)]
pub async fn get_section(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Section>> {
    principal.require_role(roles::ANY)?;
    let section = fetch(state.store.as_ref(), collections::SECTIONS, &id, "section").await?;
    Ok(Json(section))
}

#[utoipa::path(
    post,
    path = "/sections",
    tag = "Sections",
    request_body = SectionCreateRequest,
    responses((status = 201, description = "Section created", body = Section))
)]
pub async fn create_section(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<SectionCreateRequest>,
) -> AppResult<(StatusCode, Json<Section>)> {
    principal.require_role(roles::PRIVILEGED)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let mut section = Section {
        id: String::new(),
        name: payload.name,
        code: payload.code,
        order: payload.order.unwrap_or(0),
        active: payload.active.unwrap_or(true),
        created_at: Some(utc_now()),
        updated_at: None,
    };

    section.id = state.store.add(collections::SECTIONS, to_document(&section)?).await?;
    Ok((StatusCode::CREATED, Json(section)))
}

#[utoipa::path(
    patch,
    path = "/sections/{id}",
    tag = "Sections",
    params(("id" = String, Path, description = "Section id")),
    request_body = SectionUpdateRequest,
    responses(
        (status = 200, description = "Section updated", body = OkResponse),
        (status = 404, description = "Section not found")
    )
)]
pub async fn update_section(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(payload): Json<SectionUpdateRequest>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;
    apply_patch(state.store.as_ref(), collections::SECTIONS, &id, stamped(&payload)?, "section").await?;
    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/sections/{id}",
    tag = "Sections",
    params(("id" = String, Path, description = "Section id")),
    responses((status = 200, description = "Section deleted (or already absent)", body = OkResponse))
)]
pub async fn delete_section(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::ADMIN)?;
    state.store.delete(collections::SECTIONS, &id).await?;
    Ok(Json(OkResponse::ok()))
}
