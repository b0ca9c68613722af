use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;
use sqlx::query_scalar;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    /// Number of protected routes the guard knows about.
    pub routes: usize,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_check = query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;
    let routes = state.registry.routes().count();

    let (db_ok, db_error) = match db_check {
        Ok(_) => (true, None),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            (false, Some(e.to_string()))
        }
    };

    Ok(Json(HealthResponse { status: "ok", db_ok, db_error, routes }))
}
