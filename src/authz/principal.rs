use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::Role;
use crate::events::Loggable;
use crate::org::OrgRole;

/// The authenticated user as issued by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub role: Role,
    /// Role held inside a specific institute, keyed by institute id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub institute_roles: BTreeMap<String, Role>,
    /// Rank held inside a specific organization, keyed by organization id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub organization_roles: BTreeMap<String, OrgRole>,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            institute_roles: BTreeMap::new(),
            organization_roles: BTreeMap::new(),
        }
    }

    pub fn with_institute_role(mut self, institute_id: impl Into<String>, role: Role) -> Self {
        self.institute_roles.insert(institute_id.into(), role);
        self
    }

    pub fn with_organization_role(mut self, organization_id: impl Into<String>, role: OrgRole) -> Self {
        self.organization_roles.insert(organization_id.into(), role);
        self
    }

    pub fn is_super_admin(&self) -> bool {
        self.role.is_super_admin()
    }
}

impl Loggable for Principal {
    fn entity_type() -> &'static str { "session" }
    fn subject_id(&self) -> String { self.id.clone() }
}
