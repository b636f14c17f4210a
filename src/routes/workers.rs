use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::app::AppState;
use crate::authz::{resolve_profile, roles, Principal};
use crate::db::{collections, to_document, Query};
use crate::errors::{AppError, AppResult};
use crate::identity::Identity;
use crate::models::user::{Role, User, WorkerCreateRequest, WorkerListQuery, WorkerUpdateRequest};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamped};
use crate::utils::{normalize_email, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workers).post(create_worker).options(health::preflight))
        .route(
            "/:id",
            get(get_worker)
                .patch(update_worker)
                .put(update_worker)
                .delete(delete_worker)
                .options(health::preflight),
        )
}

fn ensure_crew_role(role: Role) -> AppResult<()> {
    if role.is_crew() {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "role must be one of worker, installer, brigadier (got {role})"
        )))
    }
}

/// Profile behind `id`, or not-found when it is absent or not a crew member.
async fn fetch_worker(state: &AppState, id: &str) -> AppResult<User> {
    let user: User = fetch(state.store.as_ref(), collections::USERS, id, "worker").await?;
    if !user.role.is_some_and(|role| role.is_crew()) {
        return Err(AppError::not_found("worker not found"));
    }
    Ok(user)
}

#[utoipa::path(
    get,
    path = "/workers",
    tag = "Workers",
    params(WorkerListQuery),
    responses((status = 200, description = "Crew members", body = [User]))
)]
pub async fn list_workers(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(params): QueryParams<WorkerListQuery>,
) -> AppResult<Json<Vec<User>>> {
    principal.require_role(roles::ANY)?;

    let crew = roles::CREW.iter().map(|role| Value::from(role.as_str())).collect();
    let mut query = Query::collection(collections::USERS).where_in("role", crew);
    if let Some(active) = params.active {
        query = query.where_eq("active", active);
    }

    let workers = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .map(|doc| doc.decode())
        .collect::<AppResult<Vec<User>>>()?;

    Ok(Json(workers))
}

#[utoipa::path(
    get,
    path = "/workers/{id}",
    tag = "Workers",
    params(("id" = String, Path, description = "Profile key")),
    responses(
        (status = 200, description = "Crew member", body = User),
        (status = 404, description = "Worker not found")
    )
)]
pub async fn get_worker(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    principal.require_role(roles::ANY)?;
    Ok(Json(fetch_worker(&state, &id).await?))
}

#[utoipa::path(
    post,
    path = "/workers",
    tag = "Workers",
    request_body = WorkerCreateRequest,
    responses(
        (status = 201, description = "Worker created", body = User),
        (status = 409, description = "A profile with this email exists")
    )
)]
pub async fn create_worker(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<WorkerCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    principal.require_role(roles::PRIVILEGED)?;

    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::bad_request("email is required"));
    }
    let role = payload.role.unwrap_or(Role::Installer);
    ensure_crew_role(role)?;

    let probe = Identity {
        uid: email.clone(),
        email: Some(email.clone()),
        name: None,
    };
    if resolve_profile(state.store.as_ref(), &probe).await?.is_some() {
        return Err(AppError::conflict(format!("a profile for {email} already exists")));
    }

    let mut worker = User {
        id: String::new(),
        uid: None,
        email: email.clone(),
        full_name: payload.full_name,
        role: Some(role),
        phone: payload.phone,
        notes: payload.notes.unwrap_or_default(),
        active: true,
        worker_id: None,
        created_at: Some(utc_now()),
        updated_at: None,
    };

    state.store.set(collections::USERS, &email, to_document(&worker)?).await?;
    tracing::info!(worker = %email, role = %role, by = %principal.uid, "worker created");

    worker.id = email;
    Ok((StatusCode::CREATED, Json(worker)))
}

#[utoipa::path(
    patch,
    path = "/workers/{id}",
    tag = "Workers",
    params(("id" = String, Path, description = "Profile key")),
    request_body = WorkerUpdateRequest,
    responses(
        (status = 200, description = "Worker updated", body = OkResponse),
        (status = 404, description = "Worker not found")
    )
)]
pub async fn update_worker(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(payload): Json<WorkerUpdateRequest>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;

    if let Some(role) = payload.role {
        ensure_crew_role(role)?;
    }
    fetch_worker(&state, &id).await?;

    apply_patch(state.store.as_ref(), collections::USERS, &id, stamped(&payload)?, "worker").await?;
    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/workers/{id}",
    tag = "Workers",
    params(("id" = String, Path, description = "Profile key")),
    responses(
        (status = 200, description = "Worker deleted (or already absent)", body = OkResponse),
        (status = 404, description = "Profile is not a crew member")
    )
)]
pub async fn delete_worker(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::ADMIN)?;

    if state.store.get(collections::USERS, &id).await?.is_some() {
        fetch_worker(&state, &id).await?;
        state.store.delete(collections::USERS, &id).await?;
        tracing::info!(worker = %id, by = %principal.uid, "worker deleted");
    }
    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_crew_roles_are_accepted_for_workers() {
        assert!(ensure_crew_role(Role::Brigadier).is_ok());
        assert!(matches!(ensure_crew_role(Role::Manager), Err(AppError::BadRequest(_))));
    }
}
