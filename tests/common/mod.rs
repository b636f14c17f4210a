#![allow(dead_code)]

use std::path::Path;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use crew_planner::config::Settings;
use crew_planner::create_app;
use crew_planner::db::{collections, Document, DocumentStore, SqliteDocumentStore};
use crew_planner::identity::JwtConfig;

pub struct TestApp {
    pub app: Router,
    pub store: SqliteDocumentStore,
    pub jwt: JwtConfig,
    pub settings: Settings,
    _dir: TempDir,
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let jwt = JwtConfig::new("test-secret", 1);
    let settings = Settings {
        port: 8000,
        database_url: format!("sqlite://{}", db_path.display()),
        jwt: jwt.clone(),
        allowed_origins: Vec::new(),
        upload_dir: dir.path().join("uploads"),
        public_base_url: "http://localhost:8000".to_string(),
        password_reset_url: "http://localhost:3000/reset-password".to_string(),
        tls: None,
    };

    let app = create_app(pool.clone(), &settings).await?;

    Ok(TestApp {
        app,
        store: SqliteDocumentStore::new(pool),
        jwt,
        settings,
        _dir: dir,
    })
}

impl TestApp {
    /// Stores a profile under `key` and returns a session token for `uid`.
    pub async fn login_as(&self, uid: &str, key: &str, email: &str, role: Option<&str>) -> Result<String> {
        let mut profile = json!({
            "email": email,
            "fullName": format!("{} user", role.unwrap_or("no-role")),
            "active": true,
        });
        if let Some(role) = role {
            profile["role"] = json!(role);
        }
        self.insert(collections::USERS, key, profile).await?;

        Ok(self.jwt.issue(uid, Some(email), None)?)
    }

    pub async fn admin(&self) -> Result<String> {
        self.login_as("admin-uid", "admin-uid", "admin@example.com", Some("admin")).await
    }

    pub async fn manager(&self) -> Result<String> {
        self.login_as("manager-uid", "manager-uid", "manager@example.com", Some("manager")).await
    }

    /// Crew profile keyed by email, the way `/workers` stores it.
    pub async fn crew(&self, uid: &str, email: &str, role: &str) -> Result<String> {
        self.login_as(uid, email, email, Some(role)).await
    }

    pub async fn insert(&self, collection: &str, id: &str, body: Value) -> Result<()> {
        let data: Document = body.as_object().cloned().context("document must be an object")?;
        self.store.set(collection, id, data).await?;
        Ok(())
    }

    pub async fn doc(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self.store.get(collection, id).await?.map(|doc| doc.into_value()))
    }

    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> Result<(StatusCode, Value)> {
        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };
        Ok((status, value))
    }

    /// Panics with the response body when the status differs.
    pub async fn expect(
        &self,
        expected: StatusCode,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value> {
        let (status, value) = self.call(method, uri, token, body).await?;
        if status != expected {
            panic!("{} {} returned {} (expected {}): {}", method, uri, status, expected, value);
        }
        Ok(value)
    }
}
