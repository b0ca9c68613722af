use serde::{Deserialize, Serialize};

/// Severity levels for audit entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Role and membership changes, denials
    Critical,
    /// Session lifecycle
    #[default]
    Important,
    /// Routine allow decisions
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Anything that can appear as the subject of an audit event.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. `guard` in `guard.denied`.
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> String;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "removed" | "denied" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
