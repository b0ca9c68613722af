use std::collections::BTreeSet;

use super::permission::{granted, route_permission, Permission};
use super::role::Role;

/// Permission lookups consumed by views before rendering action controls.
///
/// All queries are total: an unknown role or permission never errors, it is
/// simply not granted.
pub trait PolicyEvaluator: Send + Sync {
    /// Full grant set for `role`.
    fn get_permissions(&self, role: Role) -> BTreeSet<Permission>;

    fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.get_permissions(role).contains(&permission)
    }

    /// False for an empty request.
    fn has_any_permission(&self, role: Role, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(role, *p))
    }

    /// True for an empty request.
    fn has_all_permissions(&self, role: Role, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(role, *p))
    }

    /// Fail-closed: paths without a table entry are never accessible.
    fn can_access_route(&self, role: Role, path: &str) -> bool {
        match route_permission(path) {
            Some(required) => self.has_permission(role, required),
            None => {
                tracing::debug!(role = %role, path = %path, "route has no permission mapping");
                false
            }
        }
    }
}

/// Evaluator backed by the compiled-in role table.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessControl;

impl AccessControl {
    pub fn new() -> Self {
        Self
    }

    /// String-level lookup for callers holding raw role/permission names
    /// (token claims, query strings). Unknown names are denied.
    pub fn has_permission_str(&self, role: &str, permission: &str) -> bool {
        match (Role::parse(role), Permission::parse(permission)) {
            (Some(role), Some(permission)) => self.has_permission(role, permission),
            _ => {
                tracing::debug!(role = %role, permission = %permission, "unknown role or permission");
                false
            }
        }
    }

    pub fn get_permissions_str(&self, role: &str) -> BTreeSet<Permission> {
        Role::parse(role)
            .map(|role| self.get_permissions(role))
            .unwrap_or_default()
    }
}

impl PolicyEvaluator for AccessControl {
    fn get_permissions(&self, role: Role) -> BTreeSet<Permission> {
        granted(role).iter().copied().collect()
    }

    fn has_permission(&self, role: Role, permission: Permission) -> bool {
        let allowed = granted(role).contains(&permission);
        tracing::debug!(role = %role, permission = %permission, allowed, "permission check");
        allowed
    }
}
