use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::authz::Role;
use crate::guard::GuardState;
use crate::session::ScopeSelection;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContextQuery {
    pub path: String,
}

/// A navigation to check. The caller is identified by the bearer token, if
/// any; `scope` carries the client's in-memory selection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    #[schema(example = "/institute/INST123/class/C1/dashboard")]
    pub path: String,
    #[serde(default)]
    pub scope: ScopeSelection,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluateResponse {
    /// Registered pattern that matched `path`.
    pub route: String,
    pub effective_role: Option<Role>,
    pub guard: GuardState,
}
