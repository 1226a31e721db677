//! Prompt/skills composition: builds the system prompt from purpose, notes,
//! project instructions, skill metadata, and tool descriptions. Pure
//! in-memory string assembly — no file I/O; callers that discover
//! AGENTS.md/skill content from disk hand this module the already-read text.

use crate::tool::RegisteredTool;

/// One skill's metadata, already loaded from wherever it lives on disk.
#[derive(Debug, Clone)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
}

/// Everything the prompt composer needs beyond the agent's own
/// purpose/notes: project instructions text and discovered skill metadata.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub project_instructions: Option<String>,
    pub skills: Vec<SkillMetadata>,
}

/// Builds a system prompt from an agent's purpose/notes, optional project
/// instructions and skill metadata (each wrapped in a delimited tag), and a
/// description of every currently registered tool.
pub fn compose_system_prompt(
    purpose: Option<&str>,
    notes: Option<&str>,
    context: &PromptContext,
    tools: &[RegisteredTool],
) -> String {
    let mut sections = Vec::new();

    if let Some(purpose) = purpose {
        if !purpose.trim().is_empty() {
            sections.push(purpose.trim().to_string());
        }
    }
    if let Some(notes) = notes {
        if !notes.trim().is_empty() {
            sections.push(notes.trim().to_string());
        }
    }

    if let Some(ref instructions) = context.project_instructions {
        if !instructions.trim().is_empty() {
            sections.push(format!(
                "<project_instructions>\n{}\n</project_instructions>",
                instructions.trim()
            ));
        }
    }

    if !context.skills.is_empty() {
        let listed = context
            .skills
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "<available_skills>\n{listed}\n</available_skills>"
        ));
    }

    if !tools.is_empty() {
        let mut sorted: Vec<&RegisteredTool> = tools.iter().collect();
        sorted.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        let listed = sorted
            .iter()
            .map(|t| format!("- {}: {}", t.spec.name, t.spec.description))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Available tools:\n{listed}"));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolAttributes, ToolSourceKind, ToolSpec};

    fn tool(name: &str) -> RegisteredTool {
        RegisteredTool {
            spec: ToolSpec::new(name, format!("does {name}"), serde_json::json!({})),
            attributes: ToolAttributes::new(ToolSourceKind::Local),
        }
    }

    #[test]
    fn composes_purpose_notes_and_tools_in_order() {
        let ctx = PromptContext::default();
        let prompt = compose_system_prompt(Some("You are helpful."), Some("Be terse."), &ctx, &[tool("calculate")]);
        assert!(prompt.starts_with("You are helpful."));
        assert!(prompt.contains("Be terse."));
        assert!(prompt.contains("calculate: does calculate"));
    }

    #[test]
    fn wraps_project_instructions_and_skills_in_delimited_tags() {
        let ctx = PromptContext {
            project_instructions: Some("Always cite sources.".into()),
            skills: vec![SkillMetadata {
                name: "research".into(),
                description: "web search".into(),
            }],
        };
        let prompt = compose_system_prompt(None, None, &ctx, &[]);
        assert!(prompt.contains("<project_instructions>\nAlways cite sources.\n</project_instructions>"));
        assert!(prompt.contains("<available_skills>"));
        assert!(prompt.contains("research: web search"));
    }

    #[test]
    fn empty_inputs_produce_empty_prompt() {
        let ctx = PromptContext::default();
        assert_eq!(compose_system_prompt(None, None, &ctx, &[]), "");
    }
}
