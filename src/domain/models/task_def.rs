//! TaskDef: a per-epic, pre-merge task as produced by the scatter stage.

use serde::{Deserialize, Serialize};

/// Relative sizing estimate for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Effort {
    Small,
    Medium,
    Large,
}

impl Effort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }
}

/// Priority bucket for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    MustHave,
    ShouldHave,
    NiceToHave,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MustHave => "must-have",
            Self::ShouldHave => "should-have",
            Self::NiceToHave => "nice-to-have",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "must-have" => Some(Self::MustHave),
            "should-have" => Some(Self::ShouldHave),
            "nice-to-have" => Some(Self::NiceToHave),
            _ => None,
        }
    }
}

/// A single task produced for one epic during the scatter stage, before
/// global-id assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    /// Identifier matching `ENNN-TNN`, unique within its epic.
    pub temp_id: String,
    pub title: String,
    pub description: String,
    /// Must be non-empty.
    pub acceptance_criteria: Vec<String>,
    /// Intra-epic dependency temp-ids.
    #[serde(default)]
    pub local_dependencies: Vec<String>,
    /// Cross-epic dependencies in the form `E-NNN:label`.
    #[serde(default)]
    pub cross_epic_dependencies: Vec<String>,
    pub effort: Effort,
    pub priority: Priority,
}

/// Output of one scatter worker: all tasks for one epic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicTaskResult {
    pub epic_id: String,
    pub tasks: Vec<TaskDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effort_roundtrip() {
        for e in [Effort::Small, Effort::Medium, Effort::Large] {
            assert_eq!(Effort::from_str(e.as_str()), Some(e));
        }
        assert_eq!(Effort::from_str("huge"), None);
    }

    #[test]
    fn priority_roundtrip() {
        for p in [Priority::MustHave, Priority::ShouldHave, Priority::NiceToHave] {
            assert_eq!(Priority::from_str(p.as_str()), Some(p));
        }
        assert_eq!(Priority::from_str("urgent"), None);
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&Effort::Small).unwrap();
        assert_eq!(json, "\"small\"");
        let json = serde_json::to_string(&Priority::MustHave).unwrap();
        assert_eq!(json, "\"must-have\"");
    }
}
