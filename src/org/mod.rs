//! Organization role hierarchy
//!
//! Inside a single organization members hold one of four ranks:
//!
//! ```text
//! PRESIDENT  (exactly one)
//!     ADMIN
//!         MODERATOR
//!             MEMBER
//! ```
//!
//! These ranks are unrelated to the global [`Role`] of a user. The only bridge
//! is the global manager role (see [`Role::is_organization_manager`]), which
//! may manage any member of any organization.

mod roster;

pub use roster::{Membership, Organization};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::Role;

/// Rank inside one organization. Variant order is the rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    Member,
    Moderator,
    Admin,
    President,
}

impl OrgRole {
    /// Highest rank first.
    pub const DESCENDING: [OrgRole; 4] = [
        OrgRole::President,
        OrgRole::Admin,
        OrgRole::Moderator,
        OrgRole::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Member => "MEMBER",
            OrgRole::Moderator => "MODERATOR",
            OrgRole::Admin => "ADMIN",
            OrgRole::President => "PRESIDENT",
        }
    }

    pub fn parse(value: &str) -> Option<OrgRole> {
        let value = value.trim();
        OrgRole::DESCENDING
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrgRole::parse(s).ok_or_else(|| format!("unknown organization role: {s}"))
    }
}

/// Roles `actor` may hand out inside an organization, highest first.
///
/// Presidency is never assignable by a president; it moves only through
/// [`Organization::transfer_presidency`].
pub fn assignable_roles(actor: Option<OrgRole>, global_role: Role) -> Vec<OrgRole> {
    if global_role.is_organization_manager() {
        return OrgRole::DESCENDING.to_vec();
    }

    match actor {
        Some(OrgRole::President) => vec![OrgRole::Admin, OrgRole::Moderator, OrgRole::Member],
        Some(OrgRole::Admin) => vec![OrgRole::Moderator, OrgRole::Member],
        Some(OrgRole::Moderator) | Some(OrgRole::Member) | None => Vec::new(),
    }
}

/// Whether `actor` may change the role of, or remove, a member holding `target`.
///
/// Global managers may manage anyone; everyone else only members strictly
/// below their own rank.
pub fn can_manage_user(actor: Option<OrgRole>, actor_global: Role, target: OrgRole) -> bool {
    if actor_global.is_organization_manager() {
        return true;
    }

    match actor {
        Some(actor) => actor > target,
        None => false,
    }
}

/// [`can_manage_user`] plus a self-removal guard that takes precedence over
/// rank. Leaving an organization is a separate action ([`Organization::leave`]).
pub fn can_remove_user(
    actor: Option<OrgRole>,
    actor_global: Role,
    target: OrgRole,
    actor_id: &str,
    target_id: &str,
) -> bool {
    if actor_id == target_id {
        return false;
    }
    can_manage_user(actor, actor_global, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_totally_ordered() {
        assert!(OrgRole::Member < OrgRole::Moderator);
        assert!(OrgRole::Moderator < OrgRole::Admin);
        assert!(OrgRole::Admin < OrgRole::President);
    }

    #[test]
    fn assignable_roles_by_rank() {
        assert_eq!(
            assignable_roles(Some(OrgRole::Admin), Role::Teacher),
            vec![OrgRole::Moderator, OrgRole::Member]
        );
        assert_eq!(
            assignable_roles(Some(OrgRole::President), Role::User),
            vec![OrgRole::Admin, OrgRole::Moderator, OrgRole::Member]
        );
        assert!(assignable_roles(Some(OrgRole::Moderator), Role::User).is_empty());
        assert!(assignable_roles(Some(OrgRole::Member), Role::User).is_empty());
        assert!(assignable_roles(None, Role::User).is_empty());
    }

    #[test]
    fn managers_may_assign_every_role() {
        assert_eq!(
            assignable_roles(None, Role::OrganizationManager),
            OrgRole::DESCENDING.to_vec()
        );
        assert_eq!(
            assignable_roles(Some(OrgRole::Member), Role::SuperAdmin),
            OrgRole::DESCENDING.to_vec()
        );
    }

    #[test]
    fn can_manage_only_strictly_below() {
        for actor in OrgRole::DESCENDING {
            for target in OrgRole::DESCENDING {
                assert_eq!(
                    can_manage_user(Some(actor), Role::User, target),
                    actor > target,
                    "actor {actor} target {target}"
                );
            }
        }
    }

    #[test]
    fn non_members_manage_nobody() {
        assert!(!can_manage_user(None, Role::Teacher, OrgRole::Member));
    }

    #[test]
    fn managers_manage_everyone() {
        for target in OrgRole::DESCENDING {
            assert!(can_manage_user(None, Role::OrganizationManager, target));
        }
    }

    #[test]
    fn self_removal_always_denied() {
        for actor in OrgRole::DESCENDING {
            assert!(!can_remove_user(Some(actor), Role::User, OrgRole::Member, "u1", "u1"));
            assert!(!can_remove_user(Some(actor), Role::SuperAdmin, OrgRole::Member, "u1", "u1"));
        }
    }

    #[test]
    fn removal_follows_rank() {
        assert!(can_remove_user(Some(OrgRole::Admin), Role::User, OrgRole::Moderator, "a", "b"));
        assert!(!can_remove_user(Some(OrgRole::Admin), Role::User, OrgRole::Admin, "a", "b"));
    }

    #[test]
    fn parse_and_serde() {
        assert_eq!(OrgRole::parse("moderator"), Some(OrgRole::Moderator));
        assert_eq!(OrgRole::parse("owner"), None);
        assert_eq!(serde_json::to_string(&OrgRole::President).unwrap(), "\"PRESIDENT\"");
    }
}
