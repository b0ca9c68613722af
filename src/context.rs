//! Scope identifiers recovered from a URL path.
//!
//! Used by the guard only while the in-memory selection is still empty, e.g.
//! on a deep link or a page refresh before the session has hydrated.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::ScopeKind;

const MAX_ID_LEN: usize = 128;

/// Segments that name an action rather than an entity.
const RESERVED: &[&str] = &["new", "create", "edit"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContextIds {
    pub institute_id: Option<String>,
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub child_id: Option<String>,
    pub organization_id: Option<String>,
    pub transport_id: Option<String>,
}

impl ContextIds {
    pub fn get(&self, kind: ScopeKind) -> Option<&str> {
        match kind {
            ScopeKind::Institute => self.institute_id.as_deref(),
            ScopeKind::Class => self.class_id.as_deref(),
            ScopeKind::Subject => self.subject_id.as_deref(),
            ScopeKind::Child => self.child_id.as_deref(),
            ScopeKind::Organization => self.organization_id.as_deref(),
            ScopeKind::Transport => self.transport_id.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        ScopeKind::ORDER.iter().all(|kind| self.get(*kind).is_none())
    }

    fn slot_mut(&mut self, kind: ScopeKind) -> &mut Option<String> {
        match kind {
            ScopeKind::Institute => &mut self.institute_id,
            ScopeKind::Class => &mut self.class_id,
            ScopeKind::Subject => &mut self.subject_id,
            ScopeKind::Child => &mut self.child_id,
            ScopeKind::Organization => &mut self.organization_id,
            ScopeKind::Transport => &mut self.transport_id,
        }
    }
}

fn keyword(segment: &str) -> Option<ScopeKind> {
    match segment.to_ascii_lowercase().as_str() {
        "institute" | "institutes" => Some(ScopeKind::Institute),
        "class" | "classes" => Some(ScopeKind::Class),
        "subject" | "subjects" => Some(ScopeKind::Subject),
        "child" | "children" => Some(ScopeKind::Child),
        "organization" | "organizations" => Some(ScopeKind::Organization),
        "transport" | "transports" => Some(ScopeKind::Transport),
        _ => None,
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= MAX_ID_LEN
        && keyword(segment).is_none()
        && !RESERVED.contains(&segment.to_ascii_lowercase().as_str())
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Extract scope ids from `path`.
///
/// Recognized: `institute(s)/:id`, `class(es)/:id` under an institute,
/// `subject(s)/:id` under a class, and `child(ren)/:id`,
/// `organization(s)/:id`, `transport(s)/:id` anywhere. The first occurrence
/// of each wins. Anything else is ignored; this never fails.
pub fn parse_context_ids(path: &str) -> ContextIds {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut ids = ContextIds::default();
    let mut i = 0;
    while i < segments.len() {
        let Some(kind) = keyword(segments[i]) else {
            i += 1;
            continue;
        };
        let Some(candidate) = segments.get(i + 1).copied().filter(|s| is_id(s)) else {
            i += 1;
            continue;
        };

        let anchored = kind.parent().map_or(true, |parent| ids.get(parent).is_some());
        let slot = ids.slot_mut(kind);
        if anchored && slot.is_none() {
            *slot = Some(candidate.to_string());
        }
        i += 2;
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_institute_hierarchy() {
        let ids = parse_context_ids("/institute/INST123/class/C1/subject/MATH-9/lectures");
        assert_eq!(ids.institute_id.as_deref(), Some("INST123"));
        assert_eq!(ids.class_id.as_deref(), Some("C1"));
        assert_eq!(ids.subject_id.as_deref(), Some("MATH-9"));
        assert_eq!(ids.child_id, None);
    }

    #[test]
    fn deep_link_with_dashboard_suffix() {
        let ids = parse_context_ids("/institute/INST123/class/C1/dashboard");
        assert_eq!(ids.institute_id.as_deref(), Some("INST123"));
        assert_eq!(ids.class_id.as_deref(), Some("C1"));
        assert_eq!(ids.subject_id, None);
    }

    #[test]
    fn unknown_pattern_yields_nothing() {
        assert!(parse_context_ids("/not/a/known/pattern").is_empty());
    }

    #[test]
    fn malformed_input_never_panics() {
        for path in ["", "/", "//", "institute", "/institute/", "/institute/:id", "/class/", "/💥/institute/💥", "?x=1#y"] {
            let _ = parse_context_ids(path);
        }
        assert!(parse_context_ids("/institute/:instituteId/class/:classId").is_empty());
    }

    #[test]
    fn class_without_institute_is_ignored() {
        let ids = parse_context_ids("/class/C1/subject/S1");
        assert!(ids.is_empty());
    }

    #[test]
    fn root_scopes() {
        assert_eq!(parse_context_ids("/child/K7/attendance").child_id.as_deref(), Some("K7"));
        assert_eq!(
            parse_context_ids("/organization/ORG-5/courses").organization_id.as_deref(),
            Some("ORG-5")
        );
        assert_eq!(parse_context_ids("/transport/BUS_12").transport_id.as_deref(), Some("BUS_12"));
    }

    #[test]
    fn plural_keywords_query_and_fragment() {
        let ids = parse_context_ids("/institutes/I9/classes/C3?tab=grades#top");
        assert_eq!(ids.institute_id.as_deref(), Some("I9"));
        assert_eq!(ids.class_id.as_deref(), Some("C3"));
    }

    #[test]
    fn list_and_action_pages_carry_no_id() {
        assert!(parse_context_ids("/transport").is_empty());
        assert!(parse_context_ids("/organizations/new").is_empty());
    }

    #[test]
    fn first_occurrence_wins() {
        let ids = parse_context_ids("/institute/A/institute/B");
        assert_eq!(ids.institute_id.as_deref(), Some("A"));
    }
}
