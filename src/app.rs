use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::db::{DocumentStore, SqliteDocumentStore};
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::identity::{IdentityProvider, JwtIdentityProvider};
use crate::routes::{
    assignments, auth, files, health, projects, reports, requests, sections, statuses, users, workers,
};
use crate::storage::{LocalObjectStorage, ObjectStorage};

/// Process-wide handles, built once at start-up and shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub events: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, settings: &Settings) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool));
        let identity = Arc::new(JwtIdentityProvider::new(
            settings.jwt.clone(),
            Arc::clone(&store),
            settings.password_reset_url.clone(),
        ));
        let storage = Arc::new(LocalObjectStorage::new(
            settings.upload_dir.clone(),
            settings.public_base_url.clone(),
        ));
        let (events, _) = events::init_event_bus();

        Self {
            store,
            identity,
            storage,
            events,
        }
    }
}

pub async fn create_app(pool: SqlitePool, settings: &Settings) -> Result<Router, AppError> {
    let state = AppState::new(pool, settings);

    tokio::spawn(events::start_notification_listener(
        state.events.subscribe(),
        Arc::clone(&state.store),
    ));

    build_router(state, settings)
}

fn cors_layer(settings: &Settings) -> Result<CorsLayer, AppError> {
    let origin = if settings.allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins = settings
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| AppError::configuration(format!("invalid origin in ALLOWED_ORIGINS: {origin}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(origin)
        .allow_headers(Any))
}

pub fn build_router(state: AppState, settings: &Settings) -> Result<Router, AppError> {
    let cors = cors_layer(settings)?;

    let uploads = ServeDir::new(settings.upload_dir.clone());

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .nest("/workers", workers::routes())
        .nest("/projects", projects::routes())
        .nest("/statuses", statuses::routes())
        .nest("/sections", sections::routes())
        .nest("/assignments", assignments::routes())
        .nest("/requests", requests::routes())
        .nest("/reports", reports::routes())
        .nest("/files", files::routes())
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
