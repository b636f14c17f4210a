mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::{json, Value};

use crew_planner::db::{collections, DocumentStore, Query};

async fn plan(t: &common::TestApp, token: &str, body: Value) -> Result<u64> {
    let res = t
        .expect(StatusCode::CREATED, "POST", "/assignments", Some(token), Some(body))
        .await?;
    res["created"].as_u64().context("missing created count")
}

async fn first_id(t: &common::TestApp, token: &str, uri: &str) -> Result<String> {
    let list = t.expect(StatusCode::OK, "GET", uri, Some(token), None).await?;
    list[0]["id"].as_str().map(str::to_string).context("no assignment listed")
}

#[tokio::test]
async fn creates_one_record_per_day_and_skips_existing() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    let body = json!({
        "projectId": "p1",
        "sectionId": "s1",
        "sectionName": "Electrical",
        "dateStart": "2024-01-01",
        "dateEnd": "2024-01-03",
        "workerIds": ["A@Example.com"]
    });

    assert_eq!(plan(&t, &manager, body.clone()).await?, 3);
    assert_eq!(plan(&t, &manager, body).await?, 0);

    let list = t
        .expect(StatusCode::OK, "GET", "/assignments?projectId=p1", Some(&manager), None)
        .await?;
    let days: Vec<&str> = list
        .as_array()
        .context("list is not an array")?
        .iter()
        .filter_map(|a| a["day"].as_str())
        .collect();
    assert_eq!(days, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
    assert_eq!(list[0]["state"], json!("in_progress"));
    assert_eq!(list[0]["workerIds"], json!(["a@example.com"]));
    assert_eq!(list[0]["sectionName"], json!("Electrical"));

    // overlapping range only fills the gap
    let overlap = json!({
        "projectId": "p1",
        "sectionId": "s1",
        "dateStart": "2024-01-03",
        "dateEnd": "2024-01-04"
    });
    assert_eq!(plan(&t, &manager, overlap).await?, 1);

    // another section is a different cell
    let other = json!({"projectId": "p1", "sectionId": "s2", "dateStart": "2024-01-01", "dateEnd": "2024-01-01"});
    assert_eq!(plan(&t, &manager, other).await?, 1);

    Ok(())
}

#[tokio::test]
async fn start_after_end_is_rejected_and_nothing_is_written() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;

    let (status, body) = t
        .call(
            "POST",
            "/assignments",
            Some(&manager),
            Some(json!({"projectId": "p1", "dateStart": "2024-01-05", "dateEnd": "2024-01-01"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, _) = t
        .call(
            "POST",
            "/assignments",
            Some(&manager),
            Some(json!({"projectId": "p1", "dateStart": "05.01.2024", "dateEnd": "2024-01-06"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .call(
            "POST",
            "/assignments",
            Some(&manager),
            Some(json!({"projectId": "p1", "dateStart": "0001-01-01", "dateEnd": "9999-12-31"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(t.store.query(&Query::collection(collections::ASSIGNMENTS)).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn a_full_leap_year_is_the_longest_plan() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;

    let year = json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-12-31"});
    assert_eq!(plan(&t, &manager, year).await?, 366);

    let (status, _) = t
        .call(
            "POST",
            "/assignments",
            Some(&manager),
            Some(json!({"projectId": "p2", "dateStart": "2024-01-01", "dateEnd": "2025-01-01"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn missing_names_are_copied_from_referenced_documents() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    t.insert(collections::STATUSES, "st1", json!({"name": "Cabling", "color": "#000", "order": 1, "active": true}))
        .await?;
    t.insert(collections::SECTIONS, "sec1", json!({"name": "Access control", "order": 1, "active": true}))
        .await?;
    t.crew("w1", "w1@example.com", "installer").await?;

    let body = json!({
        "projectId": "p1",
        "statusId": "st1",
        "sectionId": "sec1",
        "dateStart": "2024-02-01",
        "dateEnd": "2024-02-01",
        "workerIds": ["w1@example.com", "ghost@example.com"]
    });
    assert_eq!(plan(&t, &manager, body).await?, 1);

    let list = t.expect(StatusCode::OK, "GET", "/assignments", Some(&manager), None).await?;
    assert_eq!(list[0]["statusName"], json!("Cabling"));
    assert_eq!(list[0]["sectionName"], json!("Access control"));
    assert_eq!(list[0]["workerNames"], json!(["installer user", "ghost@example.com"]));

    Ok(())
}

#[tokio::test]
async fn list_filters_by_worker_and_day_range() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;

    plan(
        &t,
        &manager,
        json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-01-10", "workerIds": ["a@example.com"]}),
    )
    .await?;
    plan(
        &t,
        &manager,
        json!({"projectId": "p2", "dateStart": "2024-01-01", "dateEnd": "2024-01-02", "workerIds": ["b@example.com"]}),
    )
    .await?;

    let list = t
        .expect(
            StatusCode::OK,
            "GET",
            "/assignments?workerId=A@example.com&dateFrom=2024-01-03&dateTo=2024-01-05",
            Some(&manager),
            None,
        )
        .await?;
    let list = list.as_array().context("list is not an array")?;
    assert_eq!(list.len(), 3);
    assert!(list.iter().all(|a| a["projectId"] == json!("p1")));

    Ok(())
}

#[tokio::test]
async fn unassigned_worker_cannot_touch_assignment() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    let outsider = t.crew("w2", "outsider@example.com", "worker").await?;
    plan(
        &t,
        &manager,
        json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-01-01", "workerIds": ["crew@example.com"]}),
    )
    .await?;
    let id = first_id(&t, &manager, "/assignments").await?;

    for body in [json!({"state": "done_pending"}), json!({"comments": "hi"}), json!({})] {
        let (status, _) = t
            .call("PATCH", &format!("/assignments/{id}"), Some(&outsider), Some(body))
            .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, _) = t.call("POST", &format!("/assignments/{id}/done"), Some(&outsider), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["state"], json!("in_progress"));
    Ok(())
}

#[tokio::test]
async fn assigned_worker_is_limited_to_permitted_fields_and_states() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    let worker = t.crew("w1", "crew@example.com", "installer").await?;
    plan(
        &t,
        &manager,
        json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-01-01", "workerIds": ["crew@example.com"]}),
    )
    .await?;
    let id = first_id(&t, &manager, "/assignments").await?;
    let uri = format!("/assignments/{id}");

    // one disallowed field rejects the whole patch
    let (status, body) = t
        .call("PATCH", &uri, Some(&worker), Some(json!({"state": "done_pending", "dateEnd": "2024-02-01"})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap_or_default().contains("dateEnd"));

    let (status, _) = t
        .call("PATCH", &uri, Some(&worker), Some(json!({"state": "done_approved"})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["state"], json!("in_progress"));
    assert_eq!(stored["dateEnd"], json!("2024-01-01"));

    t.expect(
        StatusCode::OK,
        "PATCH",
        &uri,
        Some(&worker),
        Some(json!({"state": "done_pending", "comments": "floor 2 finished"})),
    )
    .await?;

    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["state"], json!("done_pending"));
    assert_eq!(stored["comments"], json!("floor 2 finished"));
    assert!(stored["updatedAt"].is_string());

    Ok(())
}

#[tokio::test]
async fn privileged_patch_validates_fields_and_dates() -> Result<()> {
    let t = common::spawn_app().await?;
    let admin = t.admin().await?;
    plan(&t, &admin, json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-01-02"})).await?;
    let id = first_id(&t, &admin, "/assignments").await?;
    let uri = format!("/assignments/{id}");

    let (status, _) = t.call("PATCH", &uri, Some(&admin), Some(json!({"createdAt": "x"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.call("PATCH", &uri, Some(&admin), Some(json!({"state": "finished"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.call("PATCH", &uri, Some(&admin), Some(json!({"dateEnd": "2023-12-01"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    t.expect(
        StatusCode::OK,
        "PATCH",
        &uri,
        Some(&admin),
        Some(json!({"dateEnd": "2024-01-09", "workerIds": ["New@Example.com"], "state": "done_approved"})),
    )
    .await?;
    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["dateEnd"], json!("2024-01-09"));
    assert_eq!(stored["workerIds"], json!(["new@example.com"]));
    assert_eq!(stored["state"], json!("done_approved"));

    let (status, _) = t.call("PATCH", "/assignments/missing", Some(&admin), Some(json!({"comments": "x"}))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn moving_a_record_to_another_day_keeps_cells_unique() -> Result<()> {
    let t = common::spawn_app().await?;
    let admin = t.admin().await?;
    let cell = json!({"projectId": "p1", "sectionId": "s1", "dateStart": "2024-01-01", "dateEnd": "2024-01-02"});
    assert_eq!(plan(&t, &admin, cell).await?, 2);

    let old_id = first_id(&t, &admin, "/assignments?projectId=p1").await?;
    t.insert(
        collections::REQUESTS,
        "r1",
        json!({"assignmentId": old_id, "workerId": "a@example.com", "reason": "", "extraDays": 1, "status": "open"}),
    )
    .await?;

    let moved = t
        .expect(
            StatusCode::OK,
            "PATCH",
            &format!("/assignments/{old_id}"),
            Some(&admin),
            Some(json!({"day": "2024-01-05", "comments": "moved"})),
        )
        .await?;
    let new_id = moved["id"].as_str().context("missing id")?.to_string();
    assert_ne!(new_id, old_id);

    assert!(t.doc(collections::ASSIGNMENTS, &old_id).await?.is_none());
    let stored = t.doc(collections::ASSIGNMENTS, &new_id).await?.context("moved record missing")?;
    assert_eq!(stored["day"], json!("2024-01-05"));
    assert_eq!(stored["sectionId"], json!("s1"));
    assert_eq!(stored["comments"], json!("moved"));

    let request = t.doc(collections::REQUESTS, "r1").await?.context("request missing")?;
    assert_eq!(request["assignmentId"], json!(new_id));

    // the vacated day can be planned again
    let again = json!({"projectId": "p1", "sectionId": "s1", "dateStart": "2024-01-01", "dateEnd": "2024-01-01"});
    assert_eq!(plan(&t, &admin, again).await?, 1);
    let on_first = t
        .expect(
            StatusCode::OK,
            "GET",
            "/assignments?projectId=p1&dateFrom=2024-01-01&dateTo=2024-01-01",
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(on_first.as_array().map(Vec::len), Some(1));

    // an occupied day is refused and nothing moves
    let (status, _) = t
        .call("PATCH", &format!("/assignments/{new_id}"), Some(&admin), Some(json!({"day": "2024-01-02"})))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let stored = t.doc(collections::ASSIGNMENTS, &new_id).await?.context("record moved anyway")?;
    assert_eq!(stored["day"], json!("2024-01-05"));

    // same-cell edits keep the key
    let kept = t
        .expect(
            StatusCode::OK,
            "PATCH",
            &format!("/assignments/{new_id}"),
            Some(&admin),
            Some(json!({"day": "2024-01-05", "comments": "still here"})),
        )
        .await?;
    assert_eq!(kept["id"], json!(new_id));

    Ok(())
}

#[tokio::test]
async fn mark_done_then_approve_and_notify() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    let worker = t.crew("w1", "crew@example.com", "brigadier").await?;
    plan(
        &t,
        &manager,
        json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-01-01", "workerIds": ["crew@example.com"]}),
    )
    .await?;
    let id = first_id(&t, &manager, "/assignments").await?;

    // privileged roles are not crew
    let (status, _) = t.call("POST", &format!("/assignments/{id}/done"), Some(&manager), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.expect(StatusCode::OK, "POST", &format!("/assignments/{id}/done"), Some(&worker), None).await?;
    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["state"], json!("done_pending"));

    let (status, _) = t.call("POST", &format!("/assignments/{id}/approve"), Some(&worker), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.expect(StatusCode::OK, "POST", &format!("/assignments/{id}/approve"), Some(&manager), None).await?;
    let stored = t.doc(collections::ASSIGNMENTS, &id).await?.context("assignment vanished")?;
    assert_eq!(stored["state"], json!("done_approved"));

    // the listener persists asynchronously
    let mut notifications = Vec::new();
    for _ in 0..50 {
        notifications = t
            .store
            .query(&Query::collection(collections::NOTIFICATIONS).where_eq("assignmentId", id.as_str()))
            .await?;
        if !notifications.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].get_str("type"), Some("assignment_done_pending"));
    assert_eq!(notifications[0].get_str("actor"), Some("crew@example.com"));

    Ok(())
}

#[tokio::test]
async fn delete_requires_existing_assignment() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    plan(&t, &manager, json!({"projectId": "p1", "dateStart": "2024-01-01", "dateEnd": "2024-01-01"})).await?;
    let id = first_id(&t, &manager, "/assignments").await?;

    t.expect(StatusCode::OK, "DELETE", &format!("/assignments/{id}"), Some(&manager), None).await?;
    let (status, _) = t.call("DELETE", &format!("/assignments/{id}"), Some(&manager), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
