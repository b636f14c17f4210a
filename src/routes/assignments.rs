use std::collections::HashSet;

use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::authz::{authorize_patch, resolve_profile, roles, Principal, Resource};
use crate::db::{collections, to_document, Document, DocumentStore, Query, WriteOp};
use crate::errors::{AppError, AppResult};
use crate::events::{emit, Notification, NotificationKind};
use crate::identity::Identity;
use crate::models::assignment::{
    cell_key, Assignment, AssignmentCreateRequest, AssignmentCreateResponse, AssignmentListQuery, AssignmentPatch,
    AssignmentState, AssignmentUpdateResponse, ExtendAssignmentRequest, MAX_PLAN_DAYS,
};
use crate::models::extend_request::{
    ExtendCreatedResponse, ExtendRequest, RequestStatus, MAX_EXTRA_DAYS, MIN_EXTRA_DAYS,
};
use crate::models::OkResponse;
use crate::routes::{apply_patch, fetch, health, stamp, stamped};
use crate::utils::{days_inclusive, decode_json, normalize_email, parse_date, parse_range, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assignments).post(create_assignments).options(health::preflight))
        .route(
            "/:id",
            get(get_assignment)
                .patch(update_assignment)
                .delete(delete_assignment)
                .options(health::preflight),
        )
        .route("/:id/done", post(mark_done).options(health::preflight))
        .route("/:id/approve", post(approve_assignment).options(health::preflight))
        .route("/:id/extend", post(request_extension).options(health::preflight))
}

/// Display name of a crew member, looked up the same way the auth gate finds profiles.
pub(crate) async fn worker_name(store: &dyn DocumentStore, worker_id: &str) -> AppResult<Option<String>> {
    let probe = Identity {
        uid: worker_id.to_string(),
        email: Some(worker_id.to_string()),
        name: None,
    };

    Ok(resolve_profile(store, &probe)
        .await?
        .map(|user| user.display_name().to_string()))
}

async fn reference_name(store: &dyn DocumentStore, collection: &str, id: Option<&str>) -> AppResult<Option<String>> {
    let Some(id) = id else {
        return Ok(None);
    };

    Ok(store
        .get(collection, id)
        .await?
        .and_then(|doc| doc.get_str("name").map(str::to_string)))
}

fn in_range(day: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |from| day >= from) && to.map_or(true, |to| day <= to)
}

fn is_assigned(assignment: &Assignment, principal: &Principal) -> bool {
    principal
        .identifiers()
        .into_iter()
        .any(|identifier| assignment.is_assigned(identifier))
}

fn state_patch(state: AssignmentState) -> Document {
    let mut patch = Document::new();
    patch.insert("state".into(), json!(state));
    patch
}

/// Crew-initiated state change: same policy check as a PATCH carrying only `state`.
async fn crew_transition(
    state: &AppState,
    principal: &Principal,
    id: &str,
    target: AssignmentState,
) -> AppResult<Assignment> {
    let assignment: Assignment = fetch(state.store.as_ref(), collections::ASSIGNMENTS, id, "assignment").await?;

    let mut patch = state_patch(target);
    authorize_patch(Resource::Assignment, principal.role, &patch, is_assigned(&assignment, principal))?;

    stamp(&mut patch);
    apply_patch(state.store.as_ref(), collections::ASSIGNMENTS, id, patch, "assignment").await?;
    tracing::info!(assignment_id = %id, from = %assignment.state, to = %target, by = %principal.uid, "assignment state changed");

    Ok(assignment)
}

#[utoipa::path(
    get,
    path = "/assignments",
    tag = "Assignments",
    params(AssignmentListQuery),
    responses((status = 200, description = "Assignment days ordered by day", body = [Assignment]))
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(params): QueryParams<AssignmentListQuery>,
) -> AppResult<Json<Vec<Assignment>>> {
    principal.require_role(roles::ANY)?;

    let date_from = params.date_from.as_deref().map(|raw| parse_date("dateFrom", raw)).transpose()?;
    let date_to = params.date_to.as_deref().map(|raw| parse_date("dateTo", raw)).transpose()?;

    let mut query = Query::collection(collections::ASSIGNMENTS).order_by("day");
    if let Some(project_id) = params.project_id.as_deref() {
        query = query.where_eq("projectId", project_id);
    }
    if let Some(section_id) = params.section_id.as_deref() {
        query = query.where_eq("sectionId", section_id);
    }
    if let Some(worker_id) = params.worker_id.as_deref() {
        query = query.array_contains("workerIds", normalize_email(worker_id));
    }

    let assignments = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .map(|doc| doc.decode::<Assignment>())
        .filter(|decoded| match decoded {
            Ok(assignment) => in_range(assignment.day, date_from, date_to),
            Err(_) => true,
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(assignments))
}

#[utoipa::path(
    get,
    path = "/assignments/{id}",
    tag = "Assignments",
    params(("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment day", body = Assignment),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn get_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Assignment>> {
    principal.require_role(roles::ANY)?;
    let assignment = fetch(state.store.as_ref(), collections::ASSIGNMENTS, &id, "assignment").await?;
    Ok(Json(assignment))
}

#[utoipa::path(
    post,
    path = "/assignments",
    tag = "Assignments",
    request_body = AssignmentCreateRequest,
    responses(
        (status = 201, description = "One record per day not already planned", body = AssignmentCreateResponse),
        (status = 400, description = "Malformed dates, dateEnd before dateStart or a range over 366 days")
    )
)]
pub async fn create_assignments(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<AssignmentCreateRequest>,
) -> AppResult<(StatusCode, Json<AssignmentCreateResponse>)> {
    principal.require_role(roles::PRIVILEGED)?;

    let (date_start, date_end) = parse_range("dateStart", &payload.date_start, "dateEnd", &payload.date_end)?;
    if (date_end - date_start).num_days() >= MAX_PLAN_DAYS {
        return Err(AppError::bad_request(format!("a range may cover at most {MAX_PLAN_DAYS} days")));
    }

    let project_id = payload.project_id.trim().to_string();
    if project_id.is_empty() {
        return Err(AppError::bad_request("projectId is required"));
    }

    let store = state.store.as_ref();
    let section_id = payload.section_id.filter(|id| !id.trim().is_empty());

    let status_name = match payload.status_name {
        Some(name) => Some(name),
        None => reference_name(store, collections::STATUSES, payload.status_id.as_deref()).await?,
    };
    let section_name = match payload.section_name {
        Some(name) => Some(name),
        None => reference_name(store, collections::SECTIONS, section_id.as_deref()).await?,
    };

    let worker_ids: Vec<String> = payload
        .worker_ids
        .iter()
        .map(|id| normalize_email(id))
        .filter(|id| !id.is_empty())
        .collect();

    let worker_names = match payload.worker_names {
        Some(names) => names,
        None => {
            let mut names = Vec::with_capacity(worker_ids.len());
            for worker_id in &worker_ids {
                names.push(worker_name(store, worker_id).await?.unwrap_or_else(|| worker_id.clone()));
            }
            names
        }
    };

    let existing_query = Query::collection(collections::ASSIGNMENTS)
        .where_eq("projectId", project_id.as_str())
        .where_eq("sectionId", section_id.as_deref().map_or(Value::Null, Value::from));
    let existing: HashSet<String> = store
        .query(&existing_query)
        .await?
        .iter()
        .filter_map(|doc| doc.get_str("day").map(str::to_string))
        .collect();

    let now = utc_now();
    let comments = payload.comments.unwrap_or_default();
    let mut ops = Vec::new();

    for day in days_inclusive(date_start, date_end) {
        if existing.contains(&day.format("%Y-%m-%d").to_string()) {
            continue;
        }

        let assignment = Assignment {
            id: String::new(),
            project_id: project_id.clone(),
            status_id: payload.status_id.clone(),
            status_name: status_name.clone(),
            section_id: section_id.clone(),
            section_name: section_name.clone(),
            date_start,
            date_end,
            day,
            worker_ids: worker_ids.clone(),
            worker_names: worker_names.clone(),
            state: AssignmentState::InProgress,
            comments: comments.clone(),
            created_at: Some(now),
            updated_at: None,
        };

        ops.push(WriteOp::CreateIfAbsent {
            collection: collections::ASSIGNMENTS.to_string(),
            id: cell_key(&project_id, section_id.as_deref(), day),
            data: to_document(&assignment)?,
        });
    }

    let created = if ops.is_empty() { 0 } else { store.commit(ops).await? };
    tracing::info!(
        project_id = %project_id,
        section_id = section_id.as_deref().unwrap_or(""),
        created,
        by = %principal.uid,
        "assignments created"
    );

    Ok((StatusCode::CREATED, Json(AssignmentCreateResponse { created })))
}

/// Moves an assignment to the key of the cell it now belongs to: the merged body is created
/// under the new key, the old key is removed and open references follow, all in one batch.
async fn move_to_cell(
    store: &dyn DocumentStore,
    id: &str,
    mut data: Document,
    patch: Document,
    (project_id, section_id, day): (&str, Option<&str>, NaiveDate),
) -> AppResult<String> {
    let occupant = store
        .first(
            Query::collection(collections::ASSIGNMENTS)
                .where_eq("projectId", project_id)
                .where_eq("sectionId", section_id.map_or(Value::Null, Value::from))
                .where_eq("day", day.format("%Y-%m-%d").to_string()),
        )
        .await?;
    if occupant.is_some_and(|doc| doc.id != id) {
        return Err(AppError::conflict(format!(
            "an assignment already exists for project {project_id} on {day}"
        )));
    }

    for (field, value) in patch {
        if value.is_null() {
            data.remove(&field);
        } else {
            data.insert(field, value);
        }
    }

    let new_id = cell_key(project_id, section_id, day);
    let mut ops = vec![
        WriteOp::Create {
            collection: collections::ASSIGNMENTS.to_string(),
            id: new_id.clone(),
            data,
        },
        WriteOp::Delete {
            collection: collections::ASSIGNMENTS.to_string(),
            id: id.to_string(),
        },
    ];

    let requests = store
        .query(&Query::collection(collections::REQUESTS).where_eq("assignmentId", id))
        .await?;
    for request in requests {
        let mut link = Document::new();
        link.insert("assignmentId".into(), json!(new_id));
        ops.push(WriteOp::Update {
            collection: collections::REQUESTS.to_string(),
            id: request.id,
            patch: link,
        });
    }

    store.commit(ops).await?;
    tracing::info!(from = %id, to = %new_id, "assignment moved to another cell");

    Ok(new_id)
}

#[utoipa::path(
    patch,
    path = "/assignments/{id}",
    tag = "Assignments",
    params(("id" = String, Path, description = "Assignment id")),
    request_body = AssignmentPatch,
    responses(
        (status = 200, description = "Assignment updated", body = AssignmentUpdateResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 403, description = "Field or state not allowed for the caller"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "The target cell already holds an assignment")
    )
)]
pub async fn update_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> AppResult<Json<AssignmentUpdateResponse>> {
    let Value::Object(requested) = body else {
        return Err(AppError::bad_request("body must be a JSON object"));
    };

    let store = state.store.as_ref();
    let stored = store
        .get(collections::ASSIGNMENTS, &id)
        .await?
        .ok_or_else(|| AppError::not_found("assignment not found"))?;
    let current: Assignment = stored.clone().decode()?;
    authorize_patch(Resource::Assignment, principal.role, &requested, is_assigned(&current, &principal))?;

    let mut patch: AssignmentPatch = decode_json(Value::Object(requested))?;

    let date_start = patch.date_start.unwrap_or(current.date_start);
    let date_end = patch.date_end.unwrap_or(current.date_end);
    if date_end < date_start {
        return Err(AppError::bad_request("dateEnd must be >= dateStart"));
    }

    if let Some(worker_ids) = patch.worker_ids.as_mut() {
        *worker_ids = worker_ids.iter().map(|id| normalize_email(id)).collect();
    }

    let project_id = match patch.project_id.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("projectId must not be empty")),
        Some(project_id) => project_id.to_string(),
        None => current.project_id.clone(),
    };
    if patch.section_id.as_deref().is_some_and(|section| section.trim().is_empty()) {
        return Err(AppError::bad_request("sectionId must not be empty"));
    }
    let section_id = patch.section_id.clone().or_else(|| current.section_id.clone());
    let day = patch.day.unwrap_or(current.day);

    let moved = project_id != current.project_id || section_id != current.section_id || day != current.day;
    let id = if moved {
        let cell = (project_id.as_str(), section_id.as_deref(), day);
        move_to_cell(store, &id, stored.data, stamped(&patch)?, cell).await?
    } else {
        apply_patch(store, collections::ASSIGNMENTS, &id, stamped(&patch)?, "assignment").await?;
        id
    };

    if let Some(next) = patch.state.filter(|next| *next != current.state) {
        tracing::info!(assignment_id = %id, from = %current.state, to = %next, by = %principal.uid, "assignment state changed");

        if next == AssignmentState::DonePending {
            emit(
                &state.events,
                Notification::new(NotificationKind::AssignmentDonePending, &id).with_actor(principal.worker_key()),
            );
        }
    }

    Ok(Json(AssignmentUpdateResponse { ok: true, id }))
}

#[utoipa::path(
    delete,
    path = "/assignments/{id}",
    tag = "Assignments",
    params(("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment deleted", body = OkResponse),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;

    if !state.store.delete(collections::ASSIGNMENTS, &id).await? {
        return Err(AppError::not_found("assignment not found"));
    }

    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/assignments/{id}/done",
    tag = "Assignments",
    params(("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Marked done, awaiting approval", body = OkResponse),
        (status = 403, description = "Caller is not on the crew list"),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn mark_done(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::CREW)?;

    crew_transition(&state, &principal, &id, AssignmentState::DonePending).await?;
    emit(
        &state.events,
        Notification::new(NotificationKind::AssignmentDonePending, &id).with_actor(principal.worker_key()),
    );

    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/assignments/{id}/approve",
    tag = "Assignments",
    params(("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Work approved", body = OkResponse),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn approve_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    principal.require_role(roles::PRIVILEGED)?;

    let mut patch = state_patch(AssignmentState::DoneApproved);
    stamp(&mut patch);
    apply_patch(state.store.as_ref(), collections::ASSIGNMENTS, &id, patch, "assignment").await?;
    tracing::info!(assignment_id = %id, by = %principal.uid, "assignment approved");

    Ok(Json(OkResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/assignments/{id}/extend",
    tag = "Assignments",
    params(("id" = String, Path, description = "Assignment id")),
    request_body = ExtendAssignmentRequest,
    responses(
        (status = 201, description = "Extension requested", body = ExtendCreatedResponse),
        (status = 400, description = "extraDays outside 1..=30"),
        (status = 403, description = "Caller is not on the crew list"),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn request_extension(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(payload): Json<ExtendAssignmentRequest>,
) -> AppResult<(StatusCode, Json<ExtendCreatedResponse>)> {
    principal.require_role(roles::CREW)?;

    let extra_days = payload.extra_days.unwrap_or(MIN_EXTRA_DAYS);
    if !(MIN_EXTRA_DAYS..=MAX_EXTRA_DAYS).contains(&extra_days) {
        return Err(AppError::bad_request(format!(
            "extraDays must be between {MIN_EXTRA_DAYS} and {MAX_EXTRA_DAYS}"
        )));
    }

    let assignment: Assignment = fetch(state.store.as_ref(), collections::ASSIGNMENTS, &id, "assignment").await?;
    authorize_patch(
        Resource::Assignment,
        principal.role,
        &state_patch(AssignmentState::ExtendRequested),
        is_assigned(&assignment, &principal),
    )?;

    let request = ExtendRequest {
        id: String::new(),
        assignment_id: id.clone(),
        worker_id: principal.worker_key().to_string(),
        reason: payload.reason,
        extra_days,
        status: RequestStatus::Open,
        created_at: Some(utc_now()),
        resolved_by: None,
        resolved_at: None,
    };
    let request_id = state.store.add(collections::REQUESTS, to_document(&request)?).await?;

    crew_transition(&state, &principal, &id, AssignmentState::ExtendRequested).await?;
    emit(
        &state.events,
        Notification::new(NotificationKind::ExtendRequested, &id)
            .with_request(request_id.as_str())
            .with_actor(principal.worker_key()),
    );

    Ok((StatusCode::CREATED, Json(ExtendCreatedResponse { id: request_id, ok: true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn range_filter_is_inclusive_and_open_ended() {
        let day = date("2024-01-15");
        assert!(in_range(day, None, None));
        assert!(in_range(day, Some(day), Some(day)));
        assert!(in_range(day, Some(date("2024-01-01")), None));
        assert!(!in_range(day, Some(date("2024-01-16")), None));
        assert!(!in_range(day, None, Some(date("2024-01-14"))));
    }

    #[test]
    fn state_patch_uses_wire_name() {
        let patch = state_patch(AssignmentState::ExtendRequested);
        assert_eq!(patch.get("state"), Some(&json!("extend_requested")));
    }
}
