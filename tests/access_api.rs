use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;

use campus_gate::authz::{Principal, Role};
use campus_gate::create_app;
use campus_gate::jwt::JwtConfig;
use campus_gate::org::OrgRole;

async fn setup() -> Result<(TempDir, Router)> {
    let dir = tempdir()?;
    let pool = campus_gate::db::connect_file(&dir.path().join("access.db")).await?;
    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool).await?;
    Ok((dir, app))
}

fn token_for(user: &Principal) -> Result<String> {
    Ok(JwtConfig::new("test-secret", 1).encode(user)?)
}

async fn evaluate(app: &Router, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/access/evaluate")
        .header("content-type", "application/json");
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {}", token));
    }
    let resp: Response = app.clone().oneshot(req.body(Body::from(body.to_string()))?).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let v = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, v))
}

#[tokio::test]
async fn anonymous_visitor_is_sent_to_login() -> Result<()> {
    let (_dir, app) = setup().await?;

    let (status, v) = evaluate(&app, None, json!({"path": "/dashboard"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["route"], "/dashboard");
    assert_eq!(v["guard"]["state"], "denied");
    assert_eq!(v["guard"]["reason"]["kind"], "not_authenticated");
    assert_eq!(v["guard"]["redirect"]["to"], "/login");
    assert_eq!(v["guard"]["redirect"]["from"], "/dashboard");
    assert_eq!(v["effective_role"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn invalid_token_counts_as_signed_out() -> Result<()> {
    let (_dir, app) = setup().await?;

    let (status, v) = evaluate(&app, Some("not-a-jwt"), json!({"path": "/dashboard"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["guard"]["reason"]["kind"], "not_authenticated");

    Ok(())
}

#[tokio::test]
async fn insufficient_role_lists_allowed_roles() -> Result<()> {
    let (_dir, app) = setup().await?;
    let token = token_for(&Principal::new("s1", "Sam", Role::Student))?;

    let (_, v) = evaluate(&app, Some(&token), json!({"path": "/settings"})).await?;
    assert_eq!(v["guard"]["state"], "denied");
    assert_eq!(v["guard"]["reason"]["kind"], "insufficient_role");
    assert_eq!(v["guard"]["reason"]["required"], json!(["SuperAdmin", "InstituteAdmin"]));
    assert_eq!(v["guard"]["redirect"]["to"], "/dashboard");
    assert_eq!(v["effective_role"], "Student");

    Ok(())
}

#[tokio::test]
async fn deep_link_supplies_missing_scope() -> Result<()> {
    let (_dir, app) = setup().await?;
    let token = token_for(&Principal::new("t1", "Tia", Role::Teacher))?;

    let (_, v) = evaluate(&app, Some(&token), json!({"path": "/institute/INST123/class/C1/dashboard"})).await?;
    assert_eq!(v["route"], "/institute/:instituteId/class/:classId/*");
    assert_eq!(v["guard"]["state"], "allowed");

    Ok(())
}

#[tokio::test]
async fn selected_institute_lifts_effective_role() -> Result<()> {
    let (_dir, app) = setup().await?;
    let token = token_for(&Principal::new("t1", "Tia", Role::Teacher).with_institute_role("I1", Role::InstituteAdmin))?;

    let (_, v) = evaluate(&app, Some(&token), json!({"path": "/settings"})).await?;
    assert_eq!(v["guard"]["state"], "denied");

    let (_, v) = evaluate(
        &app,
        Some(&token),
        json!({"path": "/settings", "scope": {"institute": {"id": "I1", "name": "North Campus"}}}),
    )
    .await?;
    assert_eq!(v["effective_role"], "InstituteAdmin");
    assert_eq!(v["guard"]["state"], "allowed");

    Ok(())
}

#[tokio::test]
async fn organization_members_page_needs_moderator() -> Result<()> {
    let (_dir, app) = setup().await?;

    let member = token_for(&Principal::new("u1", "Uma", Role::User).with_organization_role("O1", OrgRole::Member))?;
    let (_, v) = evaluate(&app, Some(&member), json!({"path": "/organization/O1/members"})).await?;
    assert_eq!(v["guard"]["reason"]["kind"], "custom_validation_failed");

    let moderator = token_for(&Principal::new("u2", "Vic", Role::User).with_organization_role("O1", OrgRole::Moderator))?;
    let (_, v) = evaluate(&app, Some(&moderator), json!({"path": "/organization/O1/members"})).await?;
    assert_eq!(v["guard"]["state"], "allowed");

    let manager = token_for(&Principal::new("m1", "Mo", Role::OrganizationManager))?;
    let (_, v) = evaluate(&app, Some(&manager), json!({"path": "/organization/O9/members"})).await?;
    assert_eq!(v["guard"]["state"], "allowed");

    let (_, v) = evaluate(&app, Some(&member), json!({"path": "/organization/O1/courses"})).await?;
    assert_eq!(v["route"], "/organization/:organizationId/*");
    assert_eq!(v["guard"]["state"], "allowed");

    Ok(())
}

#[tokio::test]
async fn unregistered_path_is_not_found() -> Result<()> {
    let (_dir, app) = setup().await?;

    let (status, v) = evaluate(&app, None, json!({"path": "/login"})).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "not_found");

    Ok(())
}

#[tokio::test]
async fn context_endpoint_parses_paths() -> Result<()> {
    let (_dir, app) = setup().await?;

    let req = Request::builder()
        .uri("/api/context?path=/institute/INST123/class/C1/subject/S7/lectures")
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Value = serde_json::from_slice(&body::to_bytes(resp.into_body(), 10_485_760).await?)?;
    assert_eq!(v["institute_id"], "INST123");
    assert_eq!(v["class_id"], "C1");
    assert_eq!(v["subject_id"], "S7");
    assert_eq!(v["child_id"], Value::Null);

    let req = Request::builder()
        .uri("/api/context?path=/not/a/known/pattern")
        .body(Body::empty())?;
    let resp = app.oneshot(req).await?;
    let v: Value = serde_json::from_slice(&body::to_bytes(resp.into_body(), 10_485_760).await?)?;
    for key in ["institute_id", "class_id", "subject_id", "child_id", "organization_id", "transport_id"] {
        assert_eq!(v[key], Value::Null, "{key} should be absent");
    }

    Ok(())
}
