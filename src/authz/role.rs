use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global role carried by an authenticated user.
///
/// `User` is the generic fallback issued to accounts without a console role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    SuperAdmin,
    InstituteAdmin,
    Teacher,
    Student,
    Parent,
    Driver,
    Staff,
    OrganizationManager,
    AttendanceMarker,
    User,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::SuperAdmin,
        Role::InstituteAdmin,
        Role::Teacher,
        Role::Student,
        Role::Parent,
        Role::Driver,
        Role::Staff,
        Role::OrganizationManager,
        Role::AttendanceMarker,
        Role::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::InstituteAdmin => "InstituteAdmin",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
            Role::Parent => "Parent",
            Role::Driver => "Driver",
            Role::Staff => "Staff",
            Role::OrganizationManager => "OrganizationManager",
            Role::AttendanceMarker => "AttendanceMarker",
            Role::User => "User",
        }
    }

    /// Lenient parse: case, `_`, `-` and spaces are ignored so that
    /// `super_admin`, `SUPER-ADMIN` and `SuperAdmin` all resolve the same way.
    pub fn parse(value: &str) -> Option<Role> {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        Role::ALL
            .into_iter()
            .find(|role| role.as_str().to_lowercase() == normalized)
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Roles allowed to manage any organization's membership regardless of
    /// their rank inside it.
    pub fn is_organization_manager(&self) -> bool {
        matches!(self, Role::OrganizationManager | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}
