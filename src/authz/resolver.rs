//! Effective-role resolution.
//!
//! Global permission checks and organization member-management checks use
//! different roles and go through different functions here; neither falls
//! back to the other.

use super::principal::Principal;
use super::role::Role;
use crate::org::OrgRole;
use crate::session::ScopeSelection;

/// Role used for global permission and allow-list checks.
///
/// `SuperAdmin` is kept as-is. Otherwise, when an institute is selected and
/// the user holds a role inside it, that role wins over the global one.
pub fn effective_role(user: &Principal, scope: &ScopeSelection) -> Role {
    if user.is_super_admin() {
        return Role::SuperAdmin;
    }

    scope
        .institute
        .as_ref()
        .and_then(|institute| user.institute_roles.get(&institute.id))
        .copied()
        .unwrap_or(user.role)
}

/// Rank of `user` inside `organization_id`, if a member.
pub fn organization_role(user: &Principal, organization_id: &str) -> Option<OrgRole> {
    user.organization_roles.get(organization_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ScopeKind, ScopeRef};

    fn scope_in(institute: &str) -> ScopeSelection {
        let mut scope = ScopeSelection::default();
        scope.select(ScopeKind::Institute, Some(ScopeRef::new(institute))).unwrap();
        scope
    }

    #[test]
    fn global_role_without_institute() {
        let user = Principal::new("u1", "Ada", Role::Teacher).with_institute_role("i1", Role::InstituteAdmin);
        assert_eq!(effective_role(&user, &ScopeSelection::default()), Role::Teacher);
    }

    #[test]
    fn institute_role_overrides_inside_that_institute() {
        let user = Principal::new("u1", "Ada", Role::Teacher).with_institute_role("i1", Role::InstituteAdmin);
        assert_eq!(effective_role(&user, &scope_in("i1")), Role::InstituteAdmin);
        assert_eq!(effective_role(&user, &scope_in("i2")), Role::Teacher);
    }

    #[test]
    fn super_admin_is_preserved() {
        let user = Principal::new("root", "Root", Role::SuperAdmin).with_institute_role("i1", Role::Student);
        assert_eq!(effective_role(&user, &scope_in("i1")), Role::SuperAdmin);
    }

    #[test]
    fn organization_role_is_separate_from_global_role() {
        let user = Principal::new("u1", "Ada", Role::OrganizationManager)
            .with_organization_role("o1", OrgRole::Moderator);
        assert_eq!(organization_role(&user, "o1"), Some(OrgRole::Moderator));
        assert_eq!(organization_role(&user, "o2"), None);
    }
}
