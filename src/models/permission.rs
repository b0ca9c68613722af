use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::authz::Permission;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RolePermissionsResponse {
    #[schema(example = "Teacher")]
    pub role: String,
    /// False when the role name is not recognized; `permissions` is then empty.
    pub known: bool,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCheckRequest {
    #[schema(example = "Teacher")]
    pub role: String,
    #[schema(example = json!(["view-grades", "enter-grades"]))]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub mode: CheckMode,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionResult {
    pub permission: String,
    pub granted: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub role: String,
    pub mode: CheckMode,
    pub allowed: bool,
    pub results: Vec<PermissionResult>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RouteAccessQuery {
    /// Role name, e.g. `Teacher`
    pub role: String,
    /// Console path, e.g. `/grades/123`
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RouteAccessResponse {
    pub role: String,
    pub path: String,
    /// Permission the path's prefix maps to, if any.
    pub permission: Option<Permission>,
    pub allowed: bool,
}
