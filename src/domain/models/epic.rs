//! Epic: a coarse functional grouping produced by the shred stage.

use serde::{Deserialize, Serialize};

/// A coarse decomposition unit of a PRD, representing a body of related work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epic {
    /// Identifier matching `E-NNN` (three decimal digits).
    pub id: String,
    pub title: String,
    pub description: String,
    /// PRD section references this epic draws from.
    #[serde(default)]
    pub prd_sections: Vec<String>,
    /// Expected number of tasks this epic will decompose into.
    pub estimated_task_count: i64,
    /// Epic ids this epic depends on.
    #[serde(default)]
    pub dependencies_on_epics: Vec<String>,
}

/// Output of the shred stage: the full epic breakdown of a PRD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EpicBreakdown {
    pub epics: Vec<Epic>,
}

impl EpicBreakdown {
    pub fn epic_ids(&self) -> std::collections::HashSet<&str> {
        self.epics.iter().map(|e| e.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let breakdown = EpicBreakdown {
            epics: vec![Epic {
                id: "E-001".to_string(),
                title: "Auth".to_string(),
                description: "Authentication flows".to_string(),
                prd_sections: vec!["2.1".to_string()],
                estimated_task_count: 4,
                dependencies_on_epics: vec![],
            }],
        };

        let json = serde_json::to_string(&breakdown).unwrap();
        let back: EpicBreakdown = serde_json::from_str(&json).unwrap();
        assert_eq!(breakdown, back);

        let json2 = serde_json::to_string(&back).unwrap();
        assert_eq!(json, json2);
    }

    #[test]
    fn epic_ids_set() {
        let breakdown = EpicBreakdown {
            epics: vec![
                Epic {
                    id: "E-001".to_string(),
                    title: "A".to_string(),
                    description: "d".to_string(),
                    prd_sections: vec![],
                    estimated_task_count: 0,
                    dependencies_on_epics: vec![],
                },
                Epic {
                    id: "E-002".to_string(),
                    title: "B".to_string(),
                    description: "d".to_string(),
                    prd_sections: vec![],
                    estimated_task_count: 0,
                    dependencies_on_epics: vec!["E-001".to_string()],
                },
            ],
        };
        let ids = breakdown.epic_ids();
        assert!(ids.contains("E-001"));
        assert!(ids.contains("E-002"));
        assert_eq!(ids.len(), 2);
    }
}
