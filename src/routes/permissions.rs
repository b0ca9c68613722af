//! Permission table lookups.
//!
//! Unknown role or permission names are answered, never rejected: they hold
//! nothing and grant nothing.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::app::AppState;
use crate::authz::{route_permission, PolicyEvaluator, Role};
use crate::errors::AppError;
use crate::models::permission::*;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/permissions/check", post(check_permissions))
        .route("/permissions/:role", get(role_permissions))
        .route("/routes/access", get(route_access))
}

/// Permissions granted to a role
#[utoipa::path(
    get,
    path = "/api/permissions/{role}",
    tag = "Permissions",
    params(("role" = String, Path, description = "Role name")),
    responses((status = 200, description = "Granted permissions", body = RolePermissionsResponse))
)]
pub async fn role_permissions(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<RolePermissionsResponse>, AppError> {
    let known = Role::parse(&role).is_some();
    let permissions = state.access.get_permissions_str(&role).into_iter().collect();

    Ok(Json(RolePermissionsResponse { role, known, permissions }))
}

/// Check one or more permissions against a role
#[utoipa::path(
    post,
    path = "/api/permissions/check",
    tag = "Permissions",
    request_body = PermissionCheckRequest,
    responses((status = 200, description = "Check result", body = PermissionCheckResponse))
)]
pub async fn check_permissions(
    State(state): State<AppState>,
    Json(req): Json<PermissionCheckRequest>,
) -> Result<Json<PermissionCheckResponse>, AppError> {
    let results: Vec<PermissionResult> = req
        .permissions
        .iter()
        .map(|permission| PermissionResult {
            permission: permission.clone(),
            granted: state.access.has_permission_str(&req.role, permission),
        })
        .collect();

    // Empty lists: "any" holds nothing, "all" holds vacuously.
    let allowed = match req.mode {
        CheckMode::All => results.iter().all(|r| r.granted),
        CheckMode::Any => results.iter().any(|r| r.granted),
    };

    tracing::debug!(role = %req.role, mode = ?req.mode, allowed, "permission check");

    Ok(Json(PermissionCheckResponse {
        role: req.role,
        mode: req.mode,
        allowed,
        results,
    }))
}

/// Whether a role may open a console path
#[utoipa::path(
    get,
    path = "/api/routes/access",
    tag = "Permissions",
    params(RouteAccessQuery),
    responses((status = 200, description = "Route access", body = RouteAccessResponse))
)]
pub async fn route_access(
    State(state): State<AppState>,
    Query(query): Query<RouteAccessQuery>,
) -> Result<Json<RouteAccessResponse>, AppError> {
    let allowed = match Role::parse(&query.role) {
        Some(role) => state.access.can_access_route(role, &query.path),
        None => false,
    };

    Ok(Json(RouteAccessResponse {
        permission: route_permission(&query.path),
        role: query.role,
        path: query.path,
        allowed,
    }))
}
