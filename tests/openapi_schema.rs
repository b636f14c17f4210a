use anyhow::Result;
use serde_json::Value;

use crew_planner::docs::build_openapi;

#[test]
fn every_router_is_documented() -> Result<()> {
    let doc = build_openapi("http://localhost:8000")?;
    let value = serde_json::to_value(&doc)?;
    let paths = value["paths"].as_object().cloned().unwrap_or_default();

    for path in [
        "/health",
        "/auth/me",
        "/auth/register",
        "/users/{id}/reset",
        "/workers/{id}",
        "/projects",
        "/statuses/{id}",
        "/sections",
        "/assignments",
        "/assignments/{id}/done",
        "/requests/{id}/approve",
        "/reports/worker-load",
        "/reports/project-status",
        "/files/upload",
    ] {
        assert!(paths.contains_key(path), "missing path {path}");
    }

    let schemas = &value["components"]["schemas"];
    for schema in ["Assignment", "AssignmentPatch", "ExtendRequest", "ProjectStatusSummary", "User"] {
        assert!(schemas.get(schema).is_some(), "missing schema {schema}");
    }

    assert_eq!(
        value["components"]["securitySchemes"]["bearerAuth"]["type"],
        Value::String("http".into())
    );
    Ok(())
}
