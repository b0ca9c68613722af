use crate::authz::{organization_role, Role};
use crate::org::OrgRole;
use crate::session::ScopeKind;

use super::requirement::RouteRequirement;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Rest,
}

#[derive(Debug, Clone)]
pub struct RegisteredRoute {
    pub pattern: String,
    segments: Vec<Segment>,
    pub requirement: RouteRequirement,
}

impl RegisteredRoute {
    fn matches(&self, path: &[&str]) -> bool {
        let mut i = 0;
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Param => {
                    if i >= path.len() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if path.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
            i += 1;
        }
        i == path.len()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Ordered route table; the first matching pattern wins, so register specific
/// patterns before wildcards.
///
/// Pattern syntax: literal segments, `:name` for one arbitrary segment, and
/// a trailing `*` for any remainder (including none).
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<RegisteredRoute>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, requirement: RouteRequirement) -> Self {
        self.register(pattern, requirement);
        self
    }

    pub fn register(&mut self, pattern: &str, requirement: RouteRequirement) {
        let segments = split_path(pattern)
            .into_iter()
            .map(|s| match s {
                "*" => Segment::Rest,
                p if p.starts_with(':') => Segment::Param,
                lit => Segment::Literal(lit.to_string()),
            })
            .collect();

        self.routes.push(RegisteredRoute {
            pattern: pattern.to_string(),
            segments,
            requirement,
        });
    }

    pub fn find(&self, path: &str) -> Option<&RegisteredRoute> {
        let segments = split_path(path);
        self.routes.iter().find(|route| route.matches(&segments))
    }

    pub fn routes(&self) -> impl Iterator<Item = &RegisteredRoute> {
        self.routes.iter()
    }

    /// Route table of the institute console and the organization portal.
    pub fn console() -> Self {
        let staff_roles = [Role::SuperAdmin, Role::InstituteAdmin, Role::Teacher, Role::Staff];

        Self::new()
            .route("/dashboard", RouteRequirement::authenticated())
            .route("/institutes", RouteRequirement::authenticated().allow_roles([Role::SuperAdmin]))
            .route(
                "/settings",
                RouteRequirement::authenticated().allow_roles([Role::SuperAdmin, Role::InstituteAdmin]),
            )
            .route(
                "/institute/:instituteId/attendance/mark",
                RouteRequirement::authenticated()
                    .allow_roles([
                        Role::SuperAdmin,
                        Role::InstituteAdmin,
                        Role::Teacher,
                        Role::AttendanceMarker,
                    ])
                    .require_institute(),
            )
            .route(
                "/institute/:instituteId/users",
                RouteRequirement::authenticated()
                    .allow_roles(staff_roles)
                    .require_institute(),
            )
            .route(
                "/institute/:instituteId/class/:classId/subject/:subjectId/*",
                RouteRequirement::authenticated()
                    .require_institute()
                    .require_class()
                    .require_subject(),
            )
            .route(
                "/institute/:instituteId/class/:classId/*",
                RouteRequirement::authenticated().require_institute().require_class(),
            )
            .route("/institute/:instituteId/*", RouteRequirement::authenticated().require_institute())
            .route("/my-children", RouteRequirement::authenticated().allow_roles([Role::Parent]))
            .route(
                "/child/:childId/*",
                RouteRequirement::authenticated()
                    .allow_roles([Role::Parent])
                    .require_child(),
            )
            .route(
                "/transport/:transportId/*",
                RouteRequirement::authenticated()
                    .allow_roles([Role::SuperAdmin, Role::InstituteAdmin, Role::Driver, Role::Parent])
                    .require_transport(),
            )
            .route("/organizations", RouteRequirement::authenticated())
            .route(
                "/organization/:organizationId/members",
                RouteRequirement::authenticated()
                    .require_organization()
                    .validate_with(|ctx| {
                        if ctx.effective_role.is_organization_manager() {
                            return Ok(true);
                        }
                        let org_id = ctx
                            .scope_id(ScopeKind::Organization)
                            .ok_or_else(|| anyhow::anyhow!("organization scope vanished"))?;
                        Ok(organization_role(ctx.user, org_id) >= Some(OrgRole::Moderator))
                    }),
            )
            .route(
                "/organization/:organizationId/*",
                RouteRequirement::authenticated().require_organization(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_and_wildcards() {
        let registry = RouteRegistry::new()
            .route("/a/:id", RouteRequirement::authenticated())
            .route("/b/*", RouteRequirement::authenticated());

        assert_eq!(registry.find("/a/1").map(|r| r.pattern.as_str()), Some("/a/:id"));
        assert!(registry.find("/a").is_none());
        assert!(registry.find("/a/1/2").is_none());
        assert_eq!(registry.find("/b").map(|r| r.pattern.as_str()), Some("/b/*"));
        assert_eq!(registry.find("/b/x/y?q=1").map(|r| r.pattern.as_str()), Some("/b/*"));
        assert!(registry.find("/c").is_none());
    }

    #[test]
    fn console_prefers_specific_routes() {
        let registry = RouteRegistry::console();
        let pattern = |path: &str| registry.find(path).map(|r| r.pattern.clone());

        assert_eq!(
            pattern("/institute/I1/class/C1/subject/S1/lectures").as_deref(),
            Some("/institute/:instituteId/class/:classId/subject/:subjectId/*")
        );
        assert_eq!(
            pattern("/institute/I1/class/C1/dashboard").as_deref(),
            Some("/institute/:instituteId/class/:classId/*")
        );
        assert_eq!(
            pattern("/institute/I1/attendance/mark").as_deref(),
            Some("/institute/:instituteId/attendance/mark")
        );
        assert_eq!(pattern("/institute/I1").as_deref(), Some("/institute/:instituteId/*"));
        assert_eq!(pattern("/login"), None);
    }

    #[test]
    fn console_scope_requirements() {
        let registry = RouteRegistry::console();
        let route = registry.find("/institute/I1/class/C1/subject/S1").unwrap();
        let scopes: Vec<_> = route.requirement.scopes().collect();
        assert_eq!(scopes, vec![ScopeKind::Institute, ScopeKind::Class, ScopeKind::Subject]);
    }
}
