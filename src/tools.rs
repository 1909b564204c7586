//! The tool-schema surface (§6): descriptors for every external-interface
//! operation this engine exposes to an LLM's tool-use layer. The core
//! itself dispatches nothing here — it only has to conform to
//! [`repair_types::ToolDescriptor`]'s shape so a caller's tool-use transport
//! can validate arguments against it.

use repair_types::{ToolCategory, ToolDescriptor};
use serde_json::json;

/// The full catalog of tools this engine's external interfaces expose.
/// Grounded on `ToolDescriptor::new` baking in the mandatory `session_id`
/// property so every entry conforms without repeating that boilerplate.
pub fn tool_catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "build_image",
            "Build a container image from recipe content in a build context directory",
            "1.0",
            ToolCategory::Build,
            json!({
                "recipe_content": {"type": "string"},
                "context_directory": {"type": "string"},
                "registry": {"type": "string"},
                "image": {"type": "string"},
            }),
            json!({"type": "object", "properties": {"errors_text": {"type": "string"}}}),
            vec!["docker".to_string(), "build".to_string()],
        ),
        ToolDescriptor::new(
            "push_image",
            "Push a previously built image to its registry",
            "1.0",
            ToolCategory::Build,
            json!({"registry": {"type": "string"}, "image": {"type": "string"}}),
            json!({"type": "object"}),
            vec!["docker".to_string(), "push".to_string()],
        ),
        ToolDescriptor::new(
            "deploy_and_verify",
            "Apply a manifest and verify the resulting workload comes up healthy",
            "1.0",
            ToolCategory::Deploy,
            json!({"manifest_path": {"type": "string"}, "is_deployment": {"type": "boolean"}}),
            json!({"type": "object", "properties": {"ok": {"type": "boolean"}, "output": {"type": "string"}}}),
            vec!["kubernetes".to_string(), "deploy".to_string()],
        ),
        ToolDescriptor::new(
            "read_file",
            "Read a file's bytes from a session-qualified filesystem root",
            "1.0",
            ToolCategory::Analyze,
            json!({"path": {"type": "string"}}),
            json!({"type": "string", "contentEncoding": "base64"}),
            vec!["filesystem".to_string()],
        ),
        ToolDescriptor::new(
            "list_directory",
            "List entries under a directory in a session-qualified filesystem root",
            "1.0",
            ToolCategory::Analyze,
            json!({"path": {"type": "string"}}),
            json!({"type": "array", "items": {"type": "string"}}),
            vec!["filesystem".to_string()],
        ),
        ToolDescriptor::new(
            "search_files",
            "Find files whose name contains a substring, case-insensitively",
            "1.0",
            ToolCategory::Analyze,
            json!({"pattern": {"type": "string"}}),
            json!({"type": "array", "items": {"type": "string"}}),
            vec!["filesystem".to_string(), "search".to_string()],
        ),
        ToolDescriptor::new(
            "load_template",
            "Load a named template's text content",
            "1.0",
            ToolCategory::General,
            json!({"relative_path": {"type": "string"}}),
            json!({"type": "string"}),
            vec!["template".to_string()],
        ),
        ToolDescriptor::new(
            "list_templates",
            "List every template path in the library",
            "1.0",
            ToolCategory::General,
            json!({}),
            json!({"type": "array", "items": {"type": "string"}}),
            vec!["template".to_string()],
        ),
        ToolDescriptor::new(
            "save_session_state",
            "Persist a workflow session's current status and execution context",
            "1.0",
            ToolCategory::Session,
            json!({"workflow_id": {"type": "string"}, "execution_context": {"type": "object"}}),
            json!({"type": "object"}),
            vec!["session".to_string()],
        ),
        ToolDescriptor::new(
            "create_checkpoint",
            "Snapshot a session's state for a given stage",
            "1.0",
            ToolCategory::Orchestration,
            json!({"stage_id": {"type": "string"}, "state_snapshot": {"type": "object"}}),
            json!({"type": "object"}),
            vec!["checkpoint".to_string()],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_entry_requires_session_id() {
        for tool in tool_catalog() {
            assert!(tool.validate_session_id(&json!({"session_id": "s"})), "{} rejected a valid session_id", tool.name);
            assert!(!tool.validate_session_id(&json!({})), "{} accepted a missing session_id", tool.name);
        }
    }

    #[test]
    fn catalog_names_are_unique() {
        let names: std::collections::HashSet<_> = tool_catalog().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), tool_catalog().len());
    }
}
