//! Document type catalog.
//!
//! Each document type declares the artifacts it depends on; the planner uses
//! that list to decide which context fragments are directly relevant.

use serde::Serialize;

/// Static definition of a document type
#[derive(Debug, Clone, Copy)]
pub struct DocumentDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub dependencies: &'static [&'static str],
    pub sections: &'static [&'static str],
}

/// Document type resolved for a request (known or generic)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDocument {
    pub id: String,
    pub title: String,
    pub dependencies: Vec<String>,
    pub sections: Vec<String>,
    /// False when the id was not in the catalog
    pub known: bool,
}

impl ResolvedDocument {
    /// The document id plus its declared dependencies
    pub fn relevance_targets(&self) -> Vec<&str> {
        std::iter::once(self.id.as_str())
            .chain(self.dependencies.iter().map(String::as_str))
            .collect()
    }
}

const GENERIC_SECTIONS: &[&str] = &["Purpose", "Scope", "Details", "Open Issues"];

static DOCUMENTS: &[DocumentDefinition] = &[
    DocumentDefinition {
        id: "project-charter",
        title: "Project Charter",
        dependencies: &["business-case", "scope-statement"],
        sections: &[
            "Project Purpose and Justification",
            "Measurable Objectives",
            "High-Level Requirements",
            "Key Stakeholders",
            "Summary Milestones",
            "Summary Budget",
            "Approval Requirements",
        ],
    },
    DocumentDefinition {
        id: "business-case",
        title: "Business Case",
        dependencies: &["project-summary"],
        sections: &[
            "Problem Statement",
            "Options Considered",
            "Cost-Benefit Analysis",
            "Recommendation",
        ],
    },
    DocumentDefinition {
        id: "scope-statement",
        title: "Project Scope Statement",
        dependencies: &["project-charter", "requirements-specification"],
        sections: &[
            "Scope Description",
            "Deliverables",
            "Acceptance Criteria",
            "Exclusions",
            "Constraints and Assumptions",
        ],
    },
    DocumentDefinition {
        id: "stakeholder-register",
        title: "Stakeholder Register",
        dependencies: &["project-charter"],
        sections: &[
            "Stakeholder Identification",
            "Interests and Influence",
            "Engagement Strategy",
        ],
    },
    DocumentDefinition {
        id: "risk-register",
        title: "Risk Register",
        dependencies: &["project-charter", "scope-statement", "work-breakdown-structure"],
        sections: &[
            "Risk Identification",
            "Probability and Impact",
            "Response Strategies",
            "Risk Owners",
        ],
    },
    DocumentDefinition {
        id: "communication-plan",
        title: "Communication Management Plan",
        dependencies: &["stakeholder-register"],
        sections: &[
            "Communication Objectives",
            "Audiences and Channels",
            "Frequency and Cadence",
            "Escalation Paths",
        ],
    },
    DocumentDefinition {
        id: "requirements-specification",
        title: "Requirements Specification",
        dependencies: &["user-stories", "business-case"],
        sections: &[
            "Functional Requirements",
            "Non-Functional Requirements",
            "Traceability",
        ],
    },
    DocumentDefinition {
        id: "user-stories",
        title: "User Stories",
        dependencies: &["personas", "requirements-specification"],
        sections: &["Epics", "Stories", "Acceptance Criteria"],
    },
    DocumentDefinition {
        id: "work-breakdown-structure",
        title: "Work Breakdown Structure",
        dependencies: &["scope-statement"],
        sections: &["Deliverable Hierarchy", "Work Packages", "WBS Dictionary"],
    },
];

/// Lookup over the static document catalog
pub struct DocumentCatalog;

impl DocumentCatalog {
    pub fn all() -> &'static [DocumentDefinition] {
        DOCUMENTS
    }

    pub fn get(id: &str) -> Option<&'static DocumentDefinition> {
        DOCUMENTS.iter().find(|d| d.id == id)
    }

    /// Resolve a document id; unknown ids get a generic outline and no
    /// declared dependencies.
    pub fn resolve(id: &str) -> ResolvedDocument {
        match Self::get(id) {
            Some(def) => ResolvedDocument {
                id: def.id.to_string(),
                title: def.title.to_string(),
                dependencies: def.dependencies.iter().map(|s| s.to_string()).collect(),
                sections: def.sections.iter().map(|s| s.to_string()).collect(),
                known: true,
            },
            None => ResolvedDocument {
                id: id.to_string(),
                title: title_case(id),
                dependencies: Vec::new(),
                sections: GENERIC_SECTIONS.iter().map(|s| s.to_string()).collect(),
                known: false,
            },
        }
    }
}

fn title_case(id: &str) -> String {
    id.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
