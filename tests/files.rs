mod common;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};

use crew_planner::db::collections;

const BOUNDARY: &str = "crew-planner-test-boundary";

fn multipart_request(token: &str, project_id: Option<&str>, filename: &str, contents: &str) -> Result<Request<Body>> {
    let mut body = String::new();
    if let Some(project_id) = project_id {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"projectId\"\r\n\r\n{project_id}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n{contents}\r\n"
    ));
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Ok(Request::builder()
        .method("POST")
        .uri("/files/upload")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))?)
}

#[tokio::test]
async fn upload_attaches_file_to_project_and_serves_it() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    t.insert(
        collections::PROJECTS,
        "p1",
        json!({"name": "Depot", "startDate": "2024-01-01", "endDate": "2024-02-01", "files": ["old.pdf"]}),
    )
    .await?;

    let (status, body) = t
        .send(multipart_request(&manager, Some("p1"), "plan v1.pdf", "%PDF-1.4 test")?)
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["name"], json!("plan v1.pdf"));

    let url = body["url"].as_str().context("missing url")?;
    assert!(url.starts_with("http://localhost:8000/uploads/docs/"), "{url}");
    assert!(url.ends_with("_plan_v1.pdf"), "{url}");

    let project = t.doc(collections::PROJECTS, "p1").await?.context("project vanished")?;
    assert_eq!(project["files"], json!(["old.pdf", "plan v1.pdf"]));

    let path = url.trim_start_matches("http://localhost:8000");
    let req = Request::builder().method("GET").uri(path).body(Body::empty())?;
    let (status, served) = t.send(req).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, Value::String("%PDF-1.4 test".into()));

    Ok(())
}

#[tokio::test]
async fn upload_rejects_crew_and_unknown_projects() -> Result<()> {
    let t = common::spawn_app().await?;
    let manager = t.manager().await?;
    let worker = t.crew("w1", "w1@example.com", "installer").await?;

    let (status, _) = t.send(multipart_request(&worker, None, "a.pdf", "x")?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send(multipart_request(&manager, Some("missing"), "a.pdf", "x")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = t.send(multipart_request(&manager, None, "a.pdf", "x")?).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    Ok(())
}
