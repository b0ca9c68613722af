use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// The selectable scopes, in the order the guard checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Institute,
    Class,
    Subject,
    Child,
    Organization,
    Transport,
}

impl ScopeKind {
    pub const ORDER: [ScopeKind; 6] = [
        ScopeKind::Institute,
        ScopeKind::Class,
        ScopeKind::Subject,
        ScopeKind::Child,
        ScopeKind::Organization,
        ScopeKind::Transport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Institute => "institute",
            ScopeKind::Class => "class",
            ScopeKind::Subject => "subject",
            ScopeKind::Child => "child",
            ScopeKind::Organization => "organization",
            ScopeKind::Transport => "transport",
        }
    }

    /// Scope that must already be selected for this one to mean anything.
    pub fn parent(&self) -> Option<ScopeKind> {
        match self {
            ScopeKind::Class => Some(ScopeKind::Institute),
            ScopeKind::Subject => Some(ScopeKind::Class),
            _ => None,
        }
    }

    /// Scopes invalidated when this one changes.
    pub fn dependents(&self) -> &'static [ScopeKind] {
        match self {
            ScopeKind::Institute => &[ScopeKind::Class, ScopeKind::Subject],
            ScopeKind::Class => &[ScopeKind::Subject],
            _ => &[],
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selected institute/class/... as shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScopeRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ScopeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), name: None }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScopeSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institute: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<ScopeRef>,
}

impl ScopeSelection {
    pub fn get(&self, kind: ScopeKind) -> Option<&ScopeRef> {
        self.slot(kind).as_ref()
    }

    pub fn is_empty(&self) -> bool {
        ScopeKind::ORDER.iter().all(|kind| self.get(*kind).is_none())
    }

    fn slot(&self, kind: ScopeKind) -> &Option<ScopeRef> {
        match kind {
            ScopeKind::Institute => &self.institute,
            ScopeKind::Class => &self.class,
            ScopeKind::Subject => &self.subject,
            ScopeKind::Child => &self.child,
            ScopeKind::Organization => &self.organization,
            ScopeKind::Transport => &self.transport,
        }
    }

    fn slot_mut(&mut self, kind: ScopeKind) -> &mut Option<ScopeRef> {
        match kind {
            ScopeKind::Institute => &mut self.institute,
            ScopeKind::Class => &mut self.class,
            ScopeKind::Subject => &mut self.subject,
            ScopeKind::Child => &mut self.child,
            ScopeKind::Organization => &mut self.organization,
            ScopeKind::Transport => &mut self.transport,
        }
    }

    /// Set (or clear, with `None`) one scope.
    ///
    /// Changing a scope to a different id, or clearing it, clears the scopes
    /// below it. Selecting a class without an institute, or a subject without
    /// a class, is rejected and leaves the selection untouched.
    pub fn select(&mut self, kind: ScopeKind, value: Option<ScopeRef>) -> AppResult<()> {
        if value.is_some() {
            if let Some(parent) = kind.parent() {
                if self.get(parent).is_none() {
                    return Err(AppError::bad_request(format!("select a {parent} before a {kind}")));
                }
            }
        }

        let changed = self.get(kind).map(|r| &r.id) != value.as_ref().map(|r| &r.id);
        if changed {
            for dependent in kind.dependents() {
                *self.slot_mut(*dependent) = None;
            }
        }
        *self.slot_mut(kind) = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> ScopeSelection {
        let mut s = ScopeSelection::default();
        s.select(ScopeKind::Institute, Some(ScopeRef::named("i1", "North Campus"))).unwrap();
        s.select(ScopeKind::Class, Some(ScopeRef::new("c1"))).unwrap();
        s.select(ScopeKind::Subject, Some(ScopeRef::new("s1"))).unwrap();
        s.select(ScopeKind::Child, Some(ScopeRef::new("kid"))).unwrap();
        s
    }

    #[test]
    fn new_institute_clears_class_and_subject() {
        let mut s = full();
        s.select(ScopeKind::Institute, Some(ScopeRef::new("i2"))).unwrap();
        assert_eq!(s.institute.as_ref().map(|r| r.id.as_str()), Some("i2"));
        assert!(s.class.is_none());
        assert!(s.subject.is_none());
        assert!(s.child.is_some());
    }

    #[test]
    fn reselecting_same_institute_keeps_children() {
        let mut s = full();
        s.select(ScopeKind::Institute, Some(ScopeRef::named("i1", "Renamed"))).unwrap();
        assert!(s.class.is_some());
        assert!(s.subject.is_some());
        assert_eq!(s.institute.unwrap().name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn new_class_clears_subject_only() {
        let mut s = full();
        s.select(ScopeKind::Class, Some(ScopeRef::new("c2"))).unwrap();
        assert!(s.institute.is_some());
        assert!(s.subject.is_none());
    }

    #[test]
    fn clearing_institute_cascades() {
        let mut s = full();
        s.select(ScopeKind::Institute, None).unwrap();
        assert!(s.institute.is_none() && s.class.is_none() && s.subject.is_none());
    }

    #[test]
    fn class_requires_institute() {
        let mut s = ScopeSelection::default();
        assert!(s.select(ScopeKind::Class, Some(ScopeRef::new("c1"))).is_err());
        assert!(s.select(ScopeKind::Subject, Some(ScopeRef::new("s1"))).is_err());
        assert!(s.is_empty());
        // Clearing an unset dependent is always fine.
        s.select(ScopeKind::Subject, None).unwrap();
    }
}
