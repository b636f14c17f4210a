use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::events;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::me,
        routes::auth::register,
        routes::users::list_users,
        routes::users::get_user,
        routes::users::create_user,
        routes::users::update_user,
        routes::users::delete_user,
        routes::users::reset_password,
        routes::workers::list_workers,
        routes::workers::get_worker,
        routes::workers::create_worker,
        routes::workers::update_worker,
        routes::workers::delete_worker,
        routes::projects::list_projects,
        routes::projects::get_project,
        routes::projects::create_project,
        routes::projects::update_project,
        routes::projects::delete_project,
        routes::statuses::list_statuses,
        routes::statuses::get_status,
        routes::statuses::create_status,
        routes::statuses::update_status,
        routes::statuses::delete_status,
        routes::sections::list_sections,
        routes::sections::get_section,
        routes::sections::create_section,
        routes::sections::update_section,
        routes::sections::delete_section,
        routes::assignments::list_assignments,
        routes::assignments::get_assignment,
        routes::assignments::create_assignments,
        routes::assignments::update_assignment,
        routes::assignments::delete_assignment,
        routes::assignments::mark_done,
        routes::assignments::approve_assignment,
        routes::assignments::request_extension,
        routes::requests::list_requests,
        routes::requests::approve_request,
        routes::requests::reject_request,
        routes::reports::worker_load,
        routes::reports::project_status,
        routes::files::upload_file
    ),
    components(
        schemas(
            models::OkResponse,
            models::user::Role,
            models::user::User,
            models::user::UserCreateRequest,
            models::user::UserUpdateRequest,
            models::user::ResetLinkResponse,
            models::user::RegisterRequest,
            models::user::WorkerCreateRequest,
            models::user::WorkerUpdateRequest,
            models::project::Project,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::status::Status,
            models::status::StatusCreateRequest,
            models::status::StatusUpdateRequest,
            models::section::Section,
            models::section::SectionCreateRequest,
            models::section::SectionUpdateRequest,
            models::assignment::AssignmentState,
            models::assignment::Assignment,
            models::assignment::AssignmentCreateRequest,
            models::assignment::AssignmentCreateResponse,
            models::assignment::AssignmentUpdateResponse,
            models::assignment::AssignmentPatch,
            models::assignment::ExtendAssignmentRequest,
            models::extend_request::RequestStatus,
            models::extend_request::ExtendRequest,
            models::extend_request::ExtendCreatedResponse,
            models::report::ReportQuery,
            models::report::WorkerLoadEntry,
            models::report::ProjectStatusSummary,
            events::Notification,
            events::NotificationKind,
            routes::health::HealthResponse,
            routes::files::FileUploadForm,
            routes::files::FileUploadResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Caller profile and self-registration"),
        (name = "Users", description = "Profiles and sign-in accounts (admin)"),
        (name = "Workers", description = "Crew members"),
        (name = "Projects", description = "Construction projects"),
        (name = "Statuses", description = "Work status reference list"),
        (name = "Sections", description = "Scope-of-work sections"),
        (name = "Assignments", description = "Per-day crew assignments and their lifecycle"),
        (name = "Requests", description = "Extension requests"),
        (name = "Reports", description = "Load and status reports"),
        (name = "Files", description = "Project attachments")
    )
)]
pub struct ApiDoc;

/// OpenAPI document with the bearer scheme and `server_url` as the only server.
pub fn build_openapi(server_url: &str) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    let root = doc
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))?;

    ensure_security_components(root)?;
    ensure_global_security(root);
    ensure_servers(root, server_url);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc)?);

    let json_route = get(move || {
        let doc_json = Arc::clone(&doc_json);
        async move { Json((*doc_json).clone()) }
    });

    Ok(Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(root: &mut Map<String, Value>) -> anyhow::Result<()> {
    let schemes = root
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .and_then(|components| {
            components
                .entry("securitySchemes")
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
        })
        .ok_or_else(|| anyhow::anyhow!("components.securitySchemes must be an object"))?;

    schemes.insert(
        "bearerAuth".to_string(),
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }),
    );

    Ok(())
}

fn ensure_global_security(root: &mut Map<String, Value>) {
    root.entry("security")
        .or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn ensure_servers(root: &mut Map<String, Value>, server_url: &str) {
    root.insert("servers".to_string(), json!([{ "url": server_url }]));
}
