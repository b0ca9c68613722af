use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::authz::{Principal, Role};
use crate::context::ContextIds;
use crate::session::{ScopeKind, ScopeSelection};

/// What a custom predicate gets to look at. Everything is already resident;
/// predicates must not perform I/O.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub user: &'a Principal,
    pub effective_role: Role,
    pub scope: &'a ScopeSelection,
    pub url_context: &'a ContextIds,
    pub path: &'a str,
}

impl GuardContext<'_> {
    /// Scope id from memory, falling back to the URL.
    pub fn scope_id(&self, kind: ScopeKind) -> Option<&str> {
        self.scope
            .get(kind)
            .map(|r| r.id.as_str())
            .or_else(|| self.url_context.get(kind))
    }
}

pub type Predicate = Arc<dyn Fn(&GuardContext<'_>) -> anyhow::Result<bool> + Send + Sync>;

/// Access requirements declared when a route is registered.
#[derive(Clone, Default)]
pub struct RouteRequirement {
    pub allowed_roles: Option<Vec<Role>>,
    pub required_scopes: BTreeSet<ScopeKind>,
    pub predicate: Option<Predicate>,
    pub redirect_to: Option<String>,
}

impl fmt::Debug for RouteRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRequirement")
            .field("allowed_roles", &self.allowed_roles)
            .field("required_scopes", &self.required_scopes)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field("redirect_to", &self.redirect_to)
            .finish()
    }
}

impl RouteRequirement {
    /// Any signed-in user.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn allow_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn require(mut self, kind: ScopeKind) -> Self {
        self.required_scopes.insert(kind);
        self
    }

    pub fn require_institute(self) -> Self {
        self.require(ScopeKind::Institute)
    }

    pub fn require_class(self) -> Self {
        self.require(ScopeKind::Class)
    }

    pub fn require_subject(self) -> Self {
        self.require(ScopeKind::Subject)
    }

    pub fn require_child(self) -> Self {
        self.require(ScopeKind::Child)
    }

    pub fn require_organization(self) -> Self {
        self.require(ScopeKind::Organization)
    }

    pub fn require_transport(self) -> Self {
        self.require(ScopeKind::Transport)
    }

    pub fn validate_with<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = Some(path.into());
        self
    }

    /// Required scopes in check order.
    pub fn scopes(&self) -> impl Iterator<Item = ScopeKind> + '_ {
        ScopeKind::ORDER
            .into_iter()
            .filter(|kind| self.required_scopes.contains(kind))
    }
}
