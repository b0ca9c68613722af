use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::AccessControl;
use crate::docs;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_audit_listener, EventBus};
use crate::guard::{GuardConfig, RouteRegistry};
use crate::jwt::JwtConfig;
use crate::routes::{access, health, organizations, permissions};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub guard: Arc<GuardConfig>,
    pub registry: Arc<RouteRegistry>,
    pub access: AccessControl,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, guard: GuardConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            guard: Arc::new(guard),
            registry: Arc::new(RouteRegistry::console()),
            access: AccessControl::new(),
            event_bus,
        }
    }

    pub fn with_registry(mut self, registry: RouteRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }
}

/// Build the service from environment configuration. Spawns the audit
/// listener, so it must be called inside a tokio runtime.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let guard_config = GuardConfig::from_env()?;

    let (event_bus, audit_rx) = init_event_bus();
    tokio::spawn(start_audit_listener(audit_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, guard_config, event_bus);
    router(state)
}

pub fn router(state: AppState) -> Result<Router, AppError> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .merge(permissions::routes())
        .merge(access::routes())
        .nest("/organizations", organizations::routes());

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);
    let openapi = docs::build_openapi(port)?;

    let router = Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .merge(docs::openapi_routes(&openapi)?)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
