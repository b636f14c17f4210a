use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::db::{collections, Query};
use crate::errors::{AppError, AppResult};
use crate::models::assignment::{Assignment, AssignmentState};
use crate::models::report::{ProjectStatusSummary, ReportQuery, WorkerLoadEntry};
use crate::routes::assignments::worker_name;
use crate::routes::health;
use crate::utils::{normalize_email, parse_range};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/worker-load", post(worker_load).options(health::preflight))
        .route("/project-status", post(project_status).options(health::preflight))
}

/// Assignments in the inclusive day range, narrowed by project and crew member when given.
async fn assignments_in_range(state: &AppState, report: &ReportQuery) -> AppResult<Vec<Assignment>> {
    let (from, to) = parse_range("dateFrom", &report.date_from, "dateTo", &report.date_to)?;

    let mut query = Query::collection(collections::ASSIGNMENTS);
    if let Some(project_id) = report.project_id.as_deref() {
        query = query.where_eq("projectId", project_id);
    }
    if let Some(worker_id) = report.worker_id.as_deref() {
        query = query.array_contains("workerIds", normalize_email(worker_id));
    }

    let mut assignments = Vec::new();
    for doc in state.store.query(&query).await? {
        let assignment: Assignment = doc.decode()?;
        if assignment.day >= from && assignment.day <= to {
            assignments.push(assignment);
        }
    }

    Ok(assignments)
}

/// Day-records per crew member.
fn count_per_worker(assignments: &[Assignment], only: Option<&str>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for assignment in assignments {
        for worker_id in &assignment.worker_ids {
            let worker_id = normalize_email(worker_id);
            if only.is_some_and(|only| only != worker_id) {
                continue;
            }
            *counts.entry(worker_id).or_insert(0) += 1;
        }
    }
    counts
}

fn summarize(assignments: &[Assignment]) -> ProjectStatusSummary {
    assignments
        .iter()
        .fold(ProjectStatusSummary::default(), |mut summary, assignment| {
            match assignment.state {
                AssignmentState::InProgress => summary.in_progress += 1,
                AssignmentState::DonePending => summary.done_pending += 1,
                AssignmentState::DoneApproved => summary.done_approved += 1,
                AssignmentState::ExtendRequested => summary.extend_requested += 1,
            }
            summary
        })
}

#[utoipa::path(
    post,
    path = "/reports/worker-load",
    tag = "Reports",
    request_body = ReportQuery,
    responses(
        (status = 200, description = "Day-records per crew member, sorted by name", body = [WorkerLoadEntry]),
        (status = 400, description = "Malformed dates or dateTo before dateFrom")
    )
)]
pub async fn worker_load(
    State(state): State<AppState>,
    principal: Principal,
    Json(report): Json<ReportQuery>,
) -> AppResult<Json<Vec<WorkerLoadEntry>>> {
    principal.require_role(roles::ANY)?;

    let assignments = assignments_in_range(&state, &report).await?;
    let only = report.worker_id.as_deref().map(normalize_email);
    let counts = count_per_worker(&assignments, only.as_deref());

    let mut entries = Vec::with_capacity(counts.len());
    for (worker_id, count) in counts {
        let name = worker_name(state.store.as_ref(), &worker_id)
            .await?
            .unwrap_or_else(|| worker_id.clone());
        entries.push(WorkerLoadEntry { worker_id, name, count });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.worker_id.cmp(&b.worker_id)));

    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/reports/project-status",
    tag = "Reports",
    request_body = ReportQuery,
    responses(
        (status = 200, description = "Counts per assignment state", body = ProjectStatusSummary),
        (status = 400, description = "projectId missing or invalid dates")
    )
)]
pub async fn project_status(
    State(state): State<AppState>,
    principal: Principal,
    Json(report): Json<ReportQuery>,
) -> AppResult<Json<ProjectStatusSummary>> {
    principal.require_role(roles::PRIVILEGED)?;

    if report.project_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
        return Err(AppError::bad_request("projectId is required"));
    }

    let assignments = assignments_in_range(&state, &report).await?;
    Ok(Json(summarize(&assignments)))
}
