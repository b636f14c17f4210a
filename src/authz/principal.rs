use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::app::AppState;
use crate::db::{collections, DocumentStore, Query};
use crate::errors::{AppError, AppResult};
use crate::identity::Identity;
use crate::models::user::{Role, User};
use crate::utils::normalize_email;

/// Authenticated caller with the role taken from the stored profile.
#[derive(Debug, Clone)]
pub struct Principal {
    pub uid: String,
    /// Normalized email from the profile, or from the token when the profile has none.
    pub email: Option<String>,
    pub name: String,
    pub role: Role,
    /// Key of the profile document (uid or email).
    pub profile_id: String,
}

impl Principal {
    /// Role gate: deny unless the caller's role is in `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> AppResult<()> {
        if allowed.contains(&self.role) {
            return Ok(());
        }

        let allowed = allowed.iter().map(Role::as_str).collect::<Vec<_>>().join(", ");
        tracing::debug!(uid = %self.uid, role = %self.role, allowed = %allowed, "role denied");
        Err(AppError::forbidden(format!("role '{}' is not allowed here (allowed: {allowed})", self.role)))
    }

    /// Every identifier the caller may appear under in an assignment's crew list.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids = vec![self.uid.as_str(), self.profile_id.as_str()];
        if let Some(email) = self.email.as_deref() {
            ids.push(email);
        }
        ids
    }

    /// Identifier written into crew lists and extension requests.
    pub fn worker_key(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

/// Resolution order: profile keyed by uid, profile whose email matches, profile keyed by email.
pub async fn resolve_profile(store: &dyn DocumentStore, identity: &Identity) -> AppResult<Option<User>> {
    if let Some(doc) = store.get(collections::USERS, &identity.uid).await? {
        return Ok(Some(doc.decode()?));
    }

    let Some(email) = identity.email.as_deref().map(normalize_email).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    if let Some(doc) = store
        .first(Query::collection(collections::USERS).where_eq("email", email.as_str()))
        .await?
    {
        return Ok(Some(doc.decode()?));
    }

    match store.get(collections::USERS, &email).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

fn bearer_token(parts: &Parts) -> AppResult<&str> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("Authorization header must be a Bearer token"))?;

    Ok(token)
}

/// A verified identity that may not have a profile yet (registration).
#[derive(Debug, Clone)]
pub struct VerifiedIdentity(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for VerifiedIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let identity = state
            .identity
            .verify(token)
            .await
            .map_err(|err| AppError::unauthorized(format!("invalid token: {err}")))?;

        Ok(VerifiedIdentity(identity))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let VerifiedIdentity(identity) = VerifiedIdentity::from_request_parts(parts, state).await?;

        let profile = resolve_profile(state.store.as_ref(), &identity)
            .await?
            .ok_or_else(|| AppError::forbidden("profile not found"))?;

        let role = profile
            .role
            .ok_or_else(|| AppError::forbidden("user role not set"))?;

        let email = Some(normalize_email(&profile.email))
            .filter(|email| !email.is_empty())
            .or_else(|| identity.email.as_deref().map(normalize_email));

        let name = if profile.full_name.trim().is_empty() {
            identity.name.clone().unwrap_or_else(|| profile.display_name().to_string())
        } else {
            profile.full_name.clone()
        };

        Ok(Principal {
            uid: identity.uid,
            email,
            name,
            role,
            profile_id: profile.id,
        })
    }
}
