//! Access guard
//!
//! Decides whether a protected route may render for the current session.
//!
//! ```text
//! UNVALIDATED --> VALIDATING --+--> ALLOWED
//!                     ^        |
//!                     |        +--> DENIED
//!                     +-- any change to user, tokens, scope, path or requirement
//! ```
//!
//! [`decide`] is the pure transition function. [`AccessGuard`] wraps it with
//! memoization, transition logging and audit events, and can be driven by a
//! session subscription ([`AccessGuard::resolve`], [`AccessGuard::run`]).

mod registry;
mod requirement;

pub use registry::{RegisteredRoute, RouteRegistry};
pub use requirement::{GuardContext, Predicate, RouteRequirement};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::authz::{effective_role, Role};
use crate::context::{parse_context_ids, ContextIds};
use crate::errors::{AppError, AppResult};
use crate::events::{publish, EventBus, Loggable, Severity};
use crate::session::{save_login_redirect, ScopeKind, SessionSnapshot, SessionStorage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub login_path: String,
    pub fallback_path: String,
    pub hydration_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            fallback_path: "/dashboard".to_string(),
            hydration_timeout: Duration::from_secs(10),
        }
    }
}

impl GuardConfig {
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        let login_path = std::env::var("LOGIN_PATH").unwrap_or(defaults.login_path);
        let fallback_path = std::env::var("FALLBACK_PATH").unwrap_or(defaults.fallback_path);
        let hydration_timeout = match std::env::var("HYDRATION_TIMEOUT_MS") {
            Ok(value) => value
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| AppError::configuration("HYDRATION_TIMEOUT_MS must be a valid integer"))?,
            Err(_) => defaults.hydration_timeout,
        };

        for (name, path) in [("LOGIN_PATH", &login_path), ("FALLBACK_PATH", &fallback_path)] {
            if !path.starts_with('/') {
                return Err(AppError::configuration(format!("{name} must be an absolute path")));
            }
        }

        Ok(Self {
            login_path,
            fallback_path,
            hydration_timeout,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    NotAuthenticated,
    TokenMissing,
    InsufficientRole { required: Vec<Role> },
    MissingScope { scope: ScopeKind },
    CustomValidationFailed,
    ValidationError,
}

impl DenialReason {
    /// Denials the user resolves by signing in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, DenialReason::NotAuthenticated | DenialReason::TokenMissing)
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NotAuthenticated => f.write_str("not authenticated"),
            DenialReason::TokenMissing => f.write_str("token missing"),
            DenialReason::InsufficientRole { required } => {
                let roles: Vec<&str> = required.iter().map(Role::as_str).collect();
                write!(f, "insufficient role, requires one of: {}", roles.join(", "))
            }
            DenialReason::MissingScope { scope } => write!(f, "missing scope: select a {scope} first"),
            DenialReason::CustomValidationFailed => f.write_str("custom validation failed"),
            DenialReason::ValidationError => f.write_str("validation error occurred"),
        }
    }
}

/// Where a denied navigation goes, carrying enough to come back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Redirect {
    pub to: String,
    pub from: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Token present, user still being restored.
    Pending,
    Allow,
    Deny(DenialReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardState {
    #[default]
    Unvalidated,
    Validating,
    Allowed,
    Denied { reason: DenialReason, redirect: Redirect },
}

impl GuardState {
    pub fn name(&self) -> &'static str {
        match self {
            GuardState::Unvalidated => "unvalidated",
            GuardState::Validating => "validating",
            GuardState::Allowed => "allowed",
            GuardState::Denied { .. } => "denied",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, GuardState::Allowed | GuardState::Denied { .. })
    }
}

/// Evaluate `requirement` against `session` for a navigation to `path`.
///
/// Checks run in a fixed order and the first failure wins: user, token,
/// role allow-list, scopes (institute, class, subject, child, organization,
/// transport), custom predicate.
pub fn decide(requirement: &RouteRequirement, session: &SessionSnapshot, path: &str) -> Decision {
    let Some(user) = &session.user else {
        return if session.tokens.is_some() {
            Decision::Pending
        } else {
            Decision::Deny(DenialReason::NotAuthenticated)
        };
    };

    if session.tokens.is_none() {
        return Decision::Deny(DenialReason::TokenMissing);
    }

    let role = effective_role(user, &session.scope);
    if let Some(allowed) = &requirement.allowed_roles {
        if !allowed.contains(&role) {
            return Decision::Deny(DenialReason::InsufficientRole {
                required: allowed.clone(),
            });
        }
    }

    let url_context: ContextIds = parse_context_ids(path);
    for kind in requirement.scopes() {
        let in_memory = session.scope.get(kind).is_some();
        if !in_memory && url_context.get(kind).is_none() {
            return Decision::Deny(DenialReason::MissingScope { scope: kind });
        }
    }

    if let Some(predicate) = &requirement.predicate {
        let ctx = GuardContext {
            user,
            effective_role: role,
            scope: &session.scope,
            url_context: &url_context,
            path,
        };
        match catch_unwind(AssertUnwindSafe(|| predicate(&ctx))) {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Decision::Deny(DenialReason::CustomValidationFailed),
            Ok(Err(err)) => {
                tracing::warn!(path = %path, error = %err, "route predicate failed");
                return Decision::Deny(DenialReason::ValidationError);
            }
            Err(_) => {
                tracing::warn!(path = %path, "route predicate panicked");
                return Decision::Deny(DenialReason::ValidationError);
            }
        }
    }

    Decision::Allow
}

/// Audit record of a settled guard decision.
#[derive(Debug, Clone, Serialize)]
pub struct GuardTransition {
    pub path: String,
    pub user_id: Option<String>,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Loggable for GuardTransition {
    fn entity_type() -> &'static str { "guard" }
    fn subject_id(&self) -> String { self.path.clone() }
    fn severity(&self) -> Severity { Severity::Noise }
}

/// One guard per rendered protected route. Dropping it abandons any
/// evaluation in flight.
#[derive(Debug)]
pub struct AccessGuard {
    requirement: RouteRequirement,
    config: Arc<GuardConfig>,
    state: GuardState,
    last_input: Option<(SessionSnapshot, String)>,
    events: Option<EventBus>,
}

impl AccessGuard {
    pub fn new(requirement: RouteRequirement, config: Arc<GuardConfig>) -> Self {
        Self {
            requirement,
            config,
            state: GuardState::Unvalidated,
            last_input: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    /// Replace the route's requirement; the next evaluation starts over.
    pub fn set_requirement(&mut self, requirement: RouteRequirement) {
        self.requirement = requirement;
        self.last_input = None;
    }

    /// Re-evaluate if any input changed since the last call; otherwise return
    /// the current state untouched.
    pub fn evaluate(&mut self, session: &SessionSnapshot, path: &str) -> &GuardState {
        if let Some((last_session, last_path)) = &self.last_input {
            if last_session == session && last_path == path {
                return &self.state;
            }
        }
        self.last_input = Some((session.clone(), path.to_string()));

        self.transition(GuardState::Validating, session, path);
        let next = match decide(&self.requirement, session, path) {
            Decision::Pending => GuardState::Validating,
            Decision::Allow => GuardState::Allowed,
            Decision::Deny(reason) => {
                let redirect = self.redirect_for(&reason, path);
                GuardState::Denied { reason, redirect }
            }
        };
        self.transition(next, session, path);
        &self.state
    }

    fn redirect_for(&self, reason: &DenialReason, path: &str) -> Redirect {
        let to = match &self.requirement.redirect_to {
            Some(to) => to.clone(),
            None if reason.requires_login() => self.config.login_path.clone(),
            None => self.config.fallback_path.clone(),
        };
        Redirect {
            to,
            from: path.to_string(),
            reason: reason.to_string(),
        }
    }

    fn transition(&mut self, next: GuardState, session: &SessionSnapshot, path: &str) {
        if self.state == next {
            return;
        }
        let user_id = session.user.as_ref().map(|u| u.id.clone());

        match &next {
            GuardState::Denied { reason, redirect } => {
                tracing::info!(path = %path, user_id = ?user_id, reason = %reason, to = %redirect.to, "access denied");
            }
            other => {
                tracing::debug!(path = %path, user_id = ?user_id, from = self.state.name(), to = other.name(), "guard transition");
            }
        }

        if next.is_settled() {
            if let Some(bus) = &self.events {
                let record = GuardTransition {
                    path: path.to_string(),
                    user_id: user_id.clone(),
                    state: next.name(),
                    reason: match &next {
                        GuardState::Denied { reason, .. } => Some(reason.to_string()),
                        _ => None,
                    },
                };
                publish(bus, next.name(), user_id.as_deref(), &record);
            }
        }

        self.state = next;
    }

    /// Evaluate and, on a fresh denial or a denial for a new path, stash
    /// `path` for the post-login redirect. Storage failures are logged, never surfaced.
    async fn settle(&mut self, snapshot: &SessionSnapshot, path: &str, storage: &dyn SessionStorage) -> GuardState {
        let previous_from = match &self.state {
            GuardState::Denied { redirect, .. } => Some(redirect.from.clone()),
            _ => None,
        };
        let state = self.evaluate(snapshot, path).clone();

        if let GuardState::Denied { redirect, .. } = &state {
            if previous_from.as_deref() != Some(redirect.from.as_str()) {
                if let Err(err) = save_login_redirect(storage, &redirect.from).await {
                    tracing::warn!(error = %err, "could not store login redirect");
                }
            }
        }
        state
    }

    /// Wait until the guard settles on ALLOWED or DENIED for `path`.
    ///
    /// While the session is pending (token without user) this waits for the
    /// next session update. If the session goes away while pending the
    /// guard reports VALIDATING.
    pub async fn resolve(
        &mut self,
        session: &mut watch::Receiver<SessionSnapshot>,
        path: &str,
        storage: &dyn SessionStorage,
    ) -> GuardState {
        loop {
            let snapshot = session.borrow_and_update().clone();
            let state = self.settle(&snapshot, path, storage).await;
            if state.is_settled() {
                return state;
            }
            if session.changed().await.is_err() {
                return state;
            }
        }
    }

    /// Keep re-evaluating on every session change, publishing each state on
    /// `out`. Returns when the session or every `out` receiver is gone.
    pub async fn run(
        mut self,
        mut session: watch::Receiver<SessionSnapshot>,
        path: String,
        storage: Arc<dyn SessionStorage>,
        out: watch::Sender<GuardState>,
    ) {
        loop {
            let snapshot = session.borrow_and_update().clone();
            let state = self.settle(&snapshot, &path, storage.as_ref()).await;
            out.send_if_modified(|current| {
                if *current == state {
                    return false;
                }
                *current = state;
                true
            });
            if out.is_closed() {
                break;
            }

            tokio::select! {
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = out.closed() => break,
            }
        }
    }
}
