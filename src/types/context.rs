//! Context Graph Types
//!
//! Caller-supplied project knowledge. A [`ContextFragment`] is a named unit
//! of text (e.g. "stakeholder-register") with directed relationships to other
//! fragments or document types. The orchestration layer only reads these.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Named unit of project knowledge with relationship edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFragment {
    /// Fragment name, e.g. "user-stories"
    pub name: String,
    /// Text body included in prompts
    #[serde(default)]
    pub body: String,
    /// Names of fragments or document types this fragment relates to.
    /// Directed, may repeat, order carries no meaning.
    #[serde(default, alias = "rel")]
    pub relationships: Vec<String>,
}

impl ContextFragment {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            relationships: Vec::new(),
        }
    }

    pub fn with_relationships<I, S>(mut self, relationships: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships = relationships.into_iter().map(Into::into).collect();
        self
    }

    /// Whether any edge points at one of `targets`
    pub fn relates_to_any(&self, targets: &[&str]) -> bool {
        self.relationships
            .iter()
            .any(|rel| targets.iter().any(|t| rel == t))
    }
}

/// Full fragment set supplied with one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextGraph {
    fragments: Vec<ContextFragment>,
}

impl ContextGraph {
    pub fn new(fragments: Vec<ContextFragment>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[ContextFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Number of edges from *other* fragments naming each fragment.
    ///
    /// Repeated edges from the same source count once per occurrence;
    /// self-references are ignored.
    pub fn inbound_counts(&self) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, usize> = self
            .fragments
            .iter()
            .map(|f| (f.name.as_str(), 0))
            .collect();

        for source in &self.fragments {
            for rel in &source.relationships {
                if rel == &source.name {
                    continue;
                }
                if let Some(count) = counts.get_mut(rel.as_str()) {
                    *count += 1;
                }
            }
        }

        counts
    }
}

impl From<Vec<ContextFragment>> for ContextGraph {
    fn from(fragments: Vec<ContextFragment>) -> Self {
        Self::new(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_counts() {
        let graph = ContextGraph::new(vec![
            ContextFragment::new("a", "").with_relationships(["b", "c", "a"]),
            ContextFragment::new("b", "").with_relationships(["c"]),
            ContextFragment::new("c", ""),
        ]);

        let counts = graph.inbound_counts();
        assert_eq!(counts["a"], 0);
        assert_eq!(counts["b"], 1);
        assert_eq!(counts["c"], 2);
    }

    #[test]
    fn test_deserialize_short_form() {
        let json = r#"[{"name": "stakeholder-register", "body": "x", "rel": ["project-charter"]}]"#;
        let graph: ContextGraph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.fragments()[0].relates_to_any(&["project-charter"]));
    }
}
