use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, to_document, Query};
use crate::errors::{AppError, AppResult};
use crate::models::user::{ResetLinkResponse, User, UserCreateRequest, UserListQuery, UserUpdateRequest};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamped};
use crate::utils::{normalize_email, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user).options(health::preflight))
        .route(
            "/:id",
            get(get_user)
                .patch(update_user)
                .put(update_user)
                .delete(delete_user)
                .options(health::preflight),
        )
        .route("/:id/reset", post(reset_password).options(health::preflight))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(UserListQuery),
    responses((status = 200, description = "User profiles", body = [User]))
)]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(params): QueryParams<UserListQuery>,
) -> AppResult<Json<Vec<User>>> {
    principal.require_role(roles::ADMIN)?;

    let mut query = Query::collection(collections::USERS);
    if let Some(role) = params.role {
        query = query.where_eq("role", role.as_str());
    }

    let users = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .map(|doc| doc.decode())
        .collect::<AppResult<Vec<User>>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "Profile key")),
    responses(
        (status = 200, description = "User profile", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    principal.require_role(roles::ADMIN)?;
    let user = fetch(state.store.as_ref(), collections::USERS, &id, "user").await?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "Account and profile created", body = User),
        (status = 409, description = "Email already has an account")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    principal.require_role(roles::ADMIN)?;

    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::bad_request("email is required"));
    }

    let uid = state
        .identity
        .create_account(&email, Some(payload.full_name.as_str()))
        .await?;

    let mut user = User {
        id: String::new(),
        uid: Some(uid.clone()),
        email,
        full_name: payload.full_name,
        role: Some(payload.role),
        phone: payload.phone,
        notes: String::new(),
        active: true,
        worker_id: payload.worker_id,
        created_at: Some(utc_now()),
        updated_at: None,
    };

    let stored = match to_document(&user) {
        Ok(data) => state.store.set(collections::USERS, &uid, data).await,
        Err(err) => Err(err),
    };
    if let Err(err) = stored {
        if let Err(cleanup) = state.identity.delete_account(&uid).await {
            tracing::warn!(uid = %uid, error = %cleanup, "failed to remove account after profile write failed");
        }
        return Err(err);
    }
    tracing::info!(uid = %uid, role = %payload.role, by = %principal.uid, "user created");

    user.id = uid;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "Profile key")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = OkResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::ADMIN)?;
    apply_patch(state.store.as_ref(), collections::USERS, &id, stamped(&payload)?, "user").await?;
    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "Profile key")),
    responses((status = 200, description = "User deleted (or already absent)", body = OkResponse))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::ADMIN)?;

    let account_uid = match state.store.get(collections::USERS, &id).await? {
        Some(doc) => doc.get_str("uid").map(str::to_string),
        None => None,
    };

    state.store.delete(collections::USERS, &id).await?;

    if let Some(uid) = account_uid {
        if let Err(err) = state.identity.delete_account(&uid).await {
            tracing::warn!(uid = %uid, error = %err, "failed to delete identity account");
        }
    }

    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/users/{id}/reset",
    tag = "Users",
    params(("id" = String, Path, description = "Profile key")),
    responses(
        (status = 200, description = "Password reset link", body = ResetLinkResponse),
        (status = 404, description = "User or account not found")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<ResetLinkResponse>> {
    principal.require_role(roles::ADMIN)?;

    let user: User = fetch(state.store.as_ref(), collections::USERS, &id, "user").await?;
    let reset_link = state.identity.password_reset_link(&user.email).await?;

    Ok(Json(ResetLinkResponse { reset_link }))
}
