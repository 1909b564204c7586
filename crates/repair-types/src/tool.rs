use serde::{Deserialize, Serialize};

/// Category a tool descriptor declares itself under (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Analyze,
    Build,
    Deploy,
    Scan,
    General,
    Utility,
    Session,
    Orchestration,
}

/// `{name, description, version, category, input schema, output schema,
/// tags}` (§6). Input schemas always include a required `session_id` string
/// (length 1–100); `ToolDescriptor::new` bakes that requirement in so every
/// descriptor conforms without callers having to remember it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub version: String,
    pub category: ToolCategory,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub tags: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        category: ToolCategory,
        extra_input_properties: serde_json::Value,
        output_schema: serde_json::Value,
        tags: Vec<String>,
    ) -> Self {
        let mut properties = serde_json::json!({
            "session_id": {
                "type": "string",
                "minLength": 1,
                "maxLength": 100,
            }
        });
        if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra_input_properties.as_object()) {
            for (key, value) in extra {
                props.insert(key.clone(), value.clone());
            }
        }
        let input_schema = serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": ["session_id"],
        });

        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            category,
            input_schema,
            output_schema,
            tags,
        }
    }

    /// Validates that an argument map satisfies the mandatory `session_id`
    /// constraint this descriptor declares.
    pub fn validate_session_id(&self, args: &serde_json::Value) -> bool {
        args.get("session_id")
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty() && s.len() <= 100)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_always_requires_session_id() {
        let tool = ToolDescriptor::new(
            "build_image",
            "Build a container image",
            "1.0",
            ToolCategory::Build,
            serde_json::json!({}),
            serde_json::json!({"type": "object"}),
            vec!["docker".into()],
        );
        assert_eq!(
            tool.input_schema["required"],
            serde_json::json!(["session_id"])
        );
        assert!(tool.validate_session_id(&serde_json::json!({"session_id": "abc"})));
        assert!(!tool.validate_session_id(&serde_json::json!({"session_id": ""})));
        assert!(!tool.validate_session_id(&serde_json::json!({})));
    }

    #[test]
    fn extra_properties_are_merged_alongside_session_id() {
        let tool = ToolDescriptor::new(
            "build_image",
            "Build a container image",
            "1.0",
            ToolCategory::Build,
            serde_json::json!({"registry": {"type": "string"}}),
            serde_json::json!({}),
            vec![],
        );
        assert!(tool.input_schema["properties"]["registry"].is_object());
        assert!(tool.input_schema["properties"]["session_id"].is_object());
    }
}
