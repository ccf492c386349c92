//! Prompt Builder System
//!
//! Standardized prompt construction for document generation.
//! Individual document prompts are short; the
//! structure (role, objectives, guidelines, outline) is what the planner
//! budgets against.

pub mod catalog;

pub use catalog::{DocumentCatalog, DocumentDefinition, ResolvedDocument};

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Bulleted writing rules
    Guidelines(Vec<String>),
    /// Text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    pub fn objectives<S: AsRef<str>>(mut self, objectives: &[S]) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.iter().map(|o| o.as_ref().to_string()).collect(),
        ));
        self
    }

    pub fn guidelines<S: AsRef<str>>(mut self, rules: &[S]) -> Self {
        self.sections.push(PromptSection::Guidelines(
            rules.iter().map(|r| r.as_ref().to_string()).collect(),
        ));
        self
    }

    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str(&format!(
                        "You are an experienced {} responsible for {}.\n\n",
                        expertise, task
                    ));
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("## Objectives\n\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push('\n');
                }
                PromptSection::Guidelines(rules) => {
                    prompt.push_str("## Guidelines\n\n");
                    for rule in rules {
                        prompt.push_str(&format!("- {}\n", rule));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("## {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

/// Preset prompts for document generation
pub struct PromptTemplates;

impl PromptTemplates {
    /// System prompt shared by every document type
    pub fn document_system(document: &ResolvedDocument) -> String {
        PromptBuilder::new()
            .role(
                "project management consultant",
                &format!("writing a {}", document.title),
            )
            .guidelines(&[
                "Write in clear, professional Markdown",
                "Ground every statement in the supplied project context",
                "Mark assumptions explicitly when the context is silent",
                "Follow the requested section outline in order",
            ])
            .build()
    }

    /// User instruction for a document type (without outline or context)
    pub fn document_request(document: &ResolvedDocument) -> String {
        PromptBuilder::new()
            .objectives(&[
                format!("Produce a complete {} for this project", document.title),
                "Cross-reference related project artifacts where relevant".to_string(),
                "Keep the document actionable for the project team".to_string(),
            ])
            .build()
    }

    /// Section outline the response must follow
    pub fn document_outline(document: &ResolvedDocument) -> String {
        let mut outline = format!("## Required Outline: {}\n\n", document.title);
        for (i, section) in document.sections.iter().enumerate() {
            outline.push_str(&format!("{}. {}\n", i + 1, section));
        }
        outline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_prompt() {
        let prompt = PromptBuilder::new()
            .role("business analyst", "requirements")
            .objectives(&["Gather needs", "Write stories"])
            .build();

        assert!(prompt.contains("business analyst"));
        assert!(prompt.contains("## Objectives"));
        assert!(prompt.contains("1. Gather needs"));
        assert!(prompt.contains("2. Write stories"));
    }

    #[test]
    fn test_guidelines_and_sections() {
        let prompt = PromptBuilder::new()
            .guidelines(&["Be concise"])
            .section("Background", "Legacy CRM migration")
            .build();

        assert!(prompt.contains("- Be concise"));
        assert!(prompt.contains("## Background\n\nLegacy CRM migration"));
    }

    #[test]
    fn test_document_templates() {
        let doc = DocumentCatalog::resolve("project-charter");
        let system = PromptTemplates::document_system(&doc);
        let outline = PromptTemplates::document_outline(&doc);

        assert!(system.contains("Project Charter"));
        assert!(outline.starts_with("## Required Outline: Project Charter"));
        assert!(outline.contains("1. "));
    }
}
