use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{resolve_profile, Principal, VerifiedIdentity};
use crate::db::{collections, to_document};
use crate::errors::{AppError, AppResult};
use crate::models::user::{RegisterRequest, Role, User};
use crate::routes::{fetch, health};
use crate::utils::{normalize_email, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).options(health::preflight))
        .route("/register", post(register).options(health::preflight))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Caller's profile", body = User),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "No profile or no role")
    )
)]
pub async fn me(State(state): State<AppState>, principal: Principal) -> AppResult<Json<User>> {
    let user = fetch(state.store.as_ref(), collections::USERS, &principal.profile_id, "profile").await?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Profile created with the installer role", body = User),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Profile already exists")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    VerifiedIdentity(identity): VerifiedIdentity,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    if resolve_profile(state.store.as_ref(), &identity).await?.is_some() {
        return Err(AppError::conflict("profile already exists"));
    }

    let full_name = payload
        .full_name
        .or_else(|| identity.name.clone())
        .unwrap_or_default();

    let mut user = User {
        id: String::new(),
        uid: Some(identity.uid.clone()),
        email: identity.email.as_deref().map(normalize_email).unwrap_or_default(),
        full_name,
        role: Some(Role::Installer),
        phone: payload.phone,
        notes: String::new(),
        active: true,
        worker_id: None,
        created_at: Some(utc_now()),
        updated_at: None,
    };

    state
        .store
        .set(collections::USERS, &identity.uid, to_document(&user)?)
        .await?;
    tracing::info!(uid = %identity.uid, "profile registered");

    user.id = identity.uid;
    Ok((StatusCode::CREATED, Json(user)))
}
