use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::Role;
use crate::org::OrgRole;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignableRolesRequest {
    #[schema(example = "User")]
    pub global_role: Role,
    /// Actor's rank in the organization, absent for non-members.
    #[schema(example = "ADMIN")]
    pub org_role: Option<OrgRole>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignableRolesResponse {
    pub roles: Vec<OrgRole>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CanManageRequest {
    pub global_role: Role,
    pub org_role: Option<OrgRole>,
    pub target_role: OrgRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CanRemoveRequest {
    pub global_role: Role,
    pub org_role: Option<OrgRole>,
    pub target_role: OrgRole,
    pub actor_id: String,
    pub target_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AllowedResponse {
    pub allowed: bool,
}
