//! Guard decisions over HTTP.
//!
//! Each request is evaluated on its own: the bearer token and the posted
//! scope selection stand in for the client's session.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::app::AppState;
use crate::authz::effective_role;
use crate::context::{parse_context_ids, ContextIds};
use crate::errors::AppError;
use crate::guard::AccessGuard;
use crate::jwt::MaybeAuthUser;
use crate::models::access::*;
use crate::session::SessionSnapshot;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/access/evaluate", post(evaluate))
        .route("/context", get(context_from_path))
}

/// Evaluate a navigation against the registered route table
#[utoipa::path(
    post,
    path = "/api/access/evaluate",
    tag = "Access",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Guard verdict", body = EvaluateResponse),
        (status = 404, description = "No protected route matches the path"),
    ),
    security((), ("bearerAuth" = []))
)]
pub async fn evaluate(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let route = state
        .registry
        .find(&req.path)
        .ok_or_else(|| AppError::not_found(format!("no protected route matches {}", req.path)))?;

    // A token that fails validation is dropped, as a failed hydration would.
    let tokens = match auth.user {
        Some(_) => auth.token,
        None => None,
    };
    let session = SessionSnapshot {
        user: auth.user,
        tokens,
        scope: req.scope,
    };

    let mut guard = AccessGuard::new(route.requirement.clone(), state.guard.clone())
        .with_events(state.event_bus.clone());
    let verdict = guard.evaluate(&session, &req.path).clone();

    Ok(Json(EvaluateResponse {
        route: route.pattern.clone(),
        effective_role: session.user.as_ref().map(|user| effective_role(user, &session.scope)),
        guard: verdict,
    }))
}

/// Scope ids recoverable from a console path
#[utoipa::path(
    get,
    path = "/api/context",
    tag = "Access",
    params(ContextQuery),
    responses((status = 200, description = "Parsed ids", body = ContextIds))
)]
pub async fn context_from_path(Query(query): Query<ContextQuery>) -> Result<Json<ContextIds>, AppError> {
    Ok(Json(parse_context_ids(&query.path)))
}
