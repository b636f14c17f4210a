use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;
use uuid::Uuid;

use crate::db::{collections, Document, DocumentStore, Query};
use crate::errors::{AppError, AppResult};
use crate::utils::{normalize_email, utc_now};

const RESET_PURPOSE: &str = "password_reset";
const RESET_EXP_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret.into_bytes(), exp_hours))
    }

    /// Mints a session token for `uid`.
    pub fn issue(&self, uid: &str, email: Option<&str>, name: Option<&str>) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: uid.to_string(),
            email: email.map(str::to_string),
            name: name.map(str::to_string),
            purpose: None,
            exp: (now + Duration::hours(self.exp_hours)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> AppResult<String> {
        jsonwebtoken::encode(&Header::default(), claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

/// Identity vouched for by the provider. Carries no authorization data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> AppResult<Identity>;

    /// Creates a sign-in account and returns its uid. Conflict when the email is taken.
    async fn create_account(&self, email: &str, display_name: Option<&str>) -> AppResult<String>;

    async fn delete_account(&self, uid: &str) -> AppResult<()>;

    async fn password_reset_link(&self, email: &str) -> AppResult<String>;
}

/// HS256 bearer tokens; accounts live in the `accounts` collection.
pub struct JwtIdentityProvider {
    jwt: JwtConfig,
    store: Arc<dyn DocumentStore>,
    reset_url: String,
}

impl JwtIdentityProvider {
    pub fn new(jwt: JwtConfig, store: Arc<dyn DocumentStore>, reset_url: impl Into<String>) -> Self {
        Self {
            jwt,
            store,
            reset_url: reset_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> AppResult<Identity> {
        let claims = self.jwt.decode(token)?;

        if claims.purpose.is_some() {
            return Err(AppError::unauthorized("token is not a session token"));
        }

        Ok(Identity {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
        })
    }

    async fn create_account(&self, email: &str, display_name: Option<&str>) -> AppResult<String> {
        let email = normalize_email(email);
        let existing = self
            .store
            .first(Query::collection(collections::ACCOUNTS).where_eq("email", email.as_str()))
            .await?;
        if existing.is_some() {
            return Err(AppError::conflict(format!("account for {email} already exists")));
        }

        let uid = Uuid::new_v4().simple().to_string();
        let mut data = Document::new();
        data.insert("uid".into(), json!(uid));
        data.insert("email".into(), json!(email));
        data.insert("displayName".into(), json!(display_name));
        data.insert("createdAt".into(), json!(utc_now()));
        self.store.set(collections::ACCOUNTS, &uid, data).await?;

        tracing::info!(uid = %uid, "identity account created");
        Ok(uid)
    }

    async fn delete_account(&self, uid: &str) -> AppResult<()> {
        if !self.store.delete(collections::ACCOUNTS, uid).await? {
            return Err(AppError::not_found(format!("account {uid} not found")));
        }
        Ok(())
    }

    async fn password_reset_link(&self, email: &str) -> AppResult<String> {
        let email = normalize_email(email);
        let account = self
            .store
            .first(Query::collection(collections::ACCOUNTS).where_eq("email", email.as_str()))
            .await?
            .ok_or_else(|| AppError::not_found(format!("no account for {email}")))?;

        let now = Utc::now();
        let claims = Claims {
            sub: account.id,
            email: Some(email),
            name: None,
            purpose: Some(RESET_PURPOSE.to_string()),
            exp: (now + Duration::minutes(RESET_EXP_MINUTES)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        let token = self.jwt.encode(&claims)?;

        Ok(format!("{}?token={}", self.reset_url, token))
    }
}
