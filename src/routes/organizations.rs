use axum::{routing::post, Json, Router};

use crate::app::AppState;
use crate::errors::AppError;
use crate::models::organization::*;
use crate::org::{assignable_roles, can_manage_user, can_remove_user};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/assignable-roles", post(list_assignable_roles))
        .route("/can-manage", post(can_manage))
        .route("/can-remove", post(can_remove))
}

/// Roles an actor may hand out in an organization
#[utoipa::path(
    post,
    path = "/api/organizations/assignable-roles",
    tag = "Organizations",
    request_body = AssignableRolesRequest,
    responses((status = 200, description = "Assignable roles, highest first", body = AssignableRolesResponse))
)]
pub async fn list_assignable_roles(
    Json(req): Json<AssignableRolesRequest>,
) -> Result<Json<AssignableRolesResponse>, AppError> {
    Ok(Json(AssignableRolesResponse {
        roles: assignable_roles(req.org_role, req.global_role),
    }))
}

/// Whether an actor may change a member's role
#[utoipa::path(
    post,
    path = "/api/organizations/can-manage",
    tag = "Organizations",
    request_body = CanManageRequest,
    responses((status = 200, description = "Decision", body = AllowedResponse))
)]
pub async fn can_manage(Json(req): Json<CanManageRequest>) -> Result<Json<AllowedResponse>, AppError> {
    Ok(Json(AllowedResponse {
        allowed: can_manage_user(req.org_role, req.global_role, req.target_role),
    }))
}

/// Whether an actor may remove a member
#[utoipa::path(
    post,
    path = "/api/organizations/can-remove",
    tag = "Organizations",
    request_body = CanRemoveRequest,
    responses((status = 200, description = "Decision", body = AllowedResponse))
)]
pub async fn can_remove(Json(req): Json<CanRemoveRequest>) -> Result<Json<AllowedResponse>, AppError> {
    let allowed = can_remove_user(
        req.org_role,
        req.global_role,
        req.target_role,
        &req.actor_id,
        &req.target_id,
    );
    Ok(Json(AllowedResponse { allowed }))
}
