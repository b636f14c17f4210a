mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;

use crew_planner::db::collections;

/// One-day assignment for crew@example.com, returns (manager token, worker token, assignment id).
async fn setup(t: &common::TestApp) -> Result<(String, String, String)> {
    let manager = t.manager().await?;
    let worker = t.crew("w1", "crew@example.com", "installer").await?;

    t.expect(
        StatusCode::CREATED,
        "POST",
        "/assignments",
        Some(&manager),
        Some(json!({"projectId": "p1", "dateStart": "2024-01-10", "dateEnd": "2024-01-10", "workerIds": ["crew@example.com"]})),
    )
    .await?;
    let list = t.expect(StatusCode::OK, "GET", "/assignments", Some(&manager), None).await?;
    let id = list[0]["id"].as_str().context("no assignment")?.to_string();

    Ok((manager, worker, id))
}

#[tokio::test]
async fn extra_days_outside_bounds_is_rejected() -> Result<()> {
    let t = common::spawn_app().await?;
    let (_, worker, id) = setup(&t).await?;

    for days in [0, 31, -2] {
        let (status, _) = t
            .call(
                "POST",
                &format!("/assignments/{id}/extend"),
                Some(&worker),
                Some(json!({"reason": "rain", "extraDays": days})),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "extraDays {days}");
    }

    let requests = t.expect(StatusCode::OK, "GET", "/requests", Some(&worker), None).await?;
    assert_eq!(requests, json!([]));
    Ok(())
}

#[tokio::test]
async fn approving_extends_end_date_and_reopens_assignment() -> Result<()> {
    let t = common::spawn_app().await?;
    let (manager, worker, id) = setup(&t).await?;

    let created = t
        .expect(
            StatusCode::CREATED,
            "POST",
            &format!("/assignments/{id}/extend"),
            Some(&worker),
            Some(json!({"reason": "materials late", "extraDays": 3})),
        )
        .await?;
    assert_eq!(created["ok"], json!(true));
    let request_id = created["id"].as_str().context("missing request id")?.to_string();

    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["state"], json!("extend_requested"));

    let open = t.expect(StatusCode::OK, "GET", "/requests?status=open", Some(&manager), None).await?;
    assert_eq!(open[0]["id"], json!(request_id));
    assert_eq!(open[0]["workerId"], json!("crew@example.com"));
    assert_eq!(open[0]["extraDays"], json!(3));

    let (status, _) = t.call("POST", &format!("/requests/{request_id}/approve"), Some(&worker), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.expect(StatusCode::OK, "POST", &format!("/requests/{request_id}/approve"), Some(&manager), None)
        .await?;

    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["dateEnd"], json!("2024-01-13"));
    assert_eq!(stored["state"], json!("in_progress"));

    let request = t.doc(collections::REQUESTS, &request_id).await?.context("request vanished")?;
    assert_eq!(request["status"], json!("approved"));
    assert_eq!(request["resolvedBy"], json!("manager-uid"));

    // resolved requests cannot be resolved again
    let (status, _) = t.call("POST", &format!("/requests/{request_id}/approve"), Some(&manager), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = t.call("POST", &format!("/requests/{request_id}/reject"), Some(&manager), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn extra_days_defaults_to_one() -> Result<()> {
    let t = common::spawn_app().await?;
    let (manager, worker, id) = setup(&t).await?;

    let created = t
        .expect(StatusCode::CREATED, "POST", &format!("/assignments/{id}/extend"), Some(&worker), Some(json!({})))
        .await?;
    let request_id = created["id"].as_str().context("missing request id")?.to_string();

    t.expect(StatusCode::OK, "POST", &format!("/requests/{request_id}/approve"), Some(&manager), None)
        .await?;
    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["dateEnd"], json!("2024-01-11"));

    Ok(())
}

#[tokio::test]
async fn rejecting_leaves_assignment_untouched() -> Result<()> {
    let t = common::spawn_app().await?;
    let (manager, worker, id) = setup(&t).await?;

    let created = t
        .expect(
            StatusCode::CREATED,
            "POST",
            &format!("/assignments/{id}/extend"),
            Some(&worker),
            Some(json!({"reason": "rain", "extraDays": 2})),
        )
        .await?;
    let request_id = created["id"].as_str().context("missing request id")?.to_string();
    let before = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;

    t.expect(StatusCode::OK, "POST", &format!("/requests/{request_id}/reject"), Some(&manager), None)
        .await?;

    let after = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(before, after);

    let rejected = t.expect(StatusCode::OK, "GET", "/requests?status=rejected", Some(&manager), None).await?;
    assert_eq!(rejected[0]["id"], json!(request_id));

    Ok(())
}

#[tokio::test]
async fn unknown_request_is_not_found() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;

    let (status, _) = t.call("POST", "/requests/nope/approve", Some(&manager), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.call("POST", "/requests/nope/reject", Some(&manager), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn outsider_cannot_request_extension() -> Result<()> {
    let t = common::spawn_app().await?;
    let (_, _, id) = setup(&t).await?;
    let outsider = t.crew("w9", "other@example.com", "worker").await?;

    let (status, _) = t
        .call("POST", &format!("/assignments/{id}/extend"), Some(&outsider), Some(json!({"extraDays": 2})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
