use std::fmt::Write;

use adorable_policy::ConfirmMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationHint {
    /// Tool invoked via ```{tag}\n...\n``` fenced block in LLM response
    FencedBlock(&'static str),
    /// Tool invoked via structured `ToolCall` JSON
    ToolCall,
}

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub id: String,
    pub description: String,
    pub schema: schemars::Schema,
    pub invocation: InvocationHint,
    /// Whether the agent framework should ask the user before running it.
    pub requires_confirmation: bool,
}

impl ToolDef {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        schema: schemars::Schema,
        invocation: InvocationHint,
        confirm: ConfirmMode,
    ) -> Self {
        let id = id.into();
        Self {
            requires_confirmation: confirm.requires_confirmation(&id),
            id,
            description: description.into(),
            schema,
            invocation,
        }
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    #[must_use]
    pub fn from_definitions(tools: Vec<ToolDef>) -> Self {
        Self { tools }
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::from("<tools>\n");
        for tool in &self.tools {
            format_tool(&mut out, tool);
        }
        out.push_str("</tools>");
        out
    }
}

fn format_tool(out: &mut String, tool: &ToolDef) {
    let _ = writeln!(out, "## {}", tool.id);
    let _ = writeln!(out, "{}", tool.description);
    match tool.invocation {
        InvocationHint::FencedBlock(tag) => {
            let _ = writeln!(out, "Invocation: use ```{tag} fenced block");
        }
        InvocationHint::ToolCall => {
            let _ = writeln!(
                out,
                "Invocation: use tool_call with {{\"tool_id\": \"{}\", \"params\": {{...}}}}",
                tool.id
            );
        }
    }
    if tool.requires_confirmation {
        let _ = writeln!(out, "Requires user confirmation");
    }
    format_schema_params(out, &tool.schema);
    out.push('\n');
}

/// Primary type of an `Option<T>` property, which schemars renders as
/// `"type": ["T", "null"]` or an `anyOf` with a null branch.
fn extract_non_null_type(obj: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    if let Some(arr) = obj.get("type").and_then(|v| v.as_array()) {
        return arr.iter().filter_map(|v| v.as_str()).find(|t| *t != "null");
    }
    obj.get("anyOf")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_object())
        .filter_map(|o| o.get("type")?.as_str())
        .find(|t| *t != "null")
}

fn format_schema_params(out: &mut String, schema: &schemars::Schema) {
    let Some(obj) = schema.as_object() else {
        return;
    };
    let Some(serde_json::Value::Object(props)) = obj.get("properties") else {
        return;
    };
    if props.is_empty() {
        return;
    }

    let required: Vec<&str> = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let _ = writeln!(out, "Parameters:");
    for (name, prop) in props {
        let prop_obj = prop.as_object();
        let ty = prop_obj
            .and_then(|o| {
                o.get("type")
                    .and_then(|v| v.as_str())
                    .or_else(|| extract_non_null_type(o))
            })
            .unwrap_or("string");
        let desc = prop_obj
            .and_then(|o| o.get("description"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let req = if required.contains(&name.as_str()) {
            "required"
        } else {
            "optional"
        };
        let _ = writeln!(out, "  - {name}: {desc} ({ty}, {req})");
    }
}

#[cfg(test)]
mod tests {
    use schemars::JsonSchema;

    use super::*;

    #[derive(serde::Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct ShellArgs {
        /// Command line to run
        command: String,
        /// Lines of output to keep
        tail: Option<u32>,
    }

    fn sample_tools() -> Vec<ToolDef> {
        vec![
            ToolDef::new(
                "run_shell_command",
                "Run an allow-listed shell command",
                schemars::schema_for!(ShellArgs),
                InvocationHint::FencedBlock("bash"),
                ConfirmMode::Auto,
            ),
            ToolDef::new(
                "word_count",
                "Count words",
                schemars::schema_for!(ShellArgs),
                InvocationHint::ToolCall,
                ConfirmMode::Auto,
            ),
        ]
    }

    #[test]
    fn find_tools() {
        let reg = ToolRegistry::from_definitions(sample_tools());
        assert_eq!(reg.tools().len(), 2);
        assert!(reg.find("run_shell_command").is_some());
        assert!(reg.find("nonexistent").is_none());
        assert!(ToolRegistry::default().tools().is_empty());
    }

    #[test]
    fn confirmation_follows_mode() {
        let tools = sample_tools();
        assert!(tools[0].requires_confirmation);
        assert!(!tools[1].requires_confirmation);
    }

    #[test]
    fn format_for_prompt_sections() {
        let prompt = ToolRegistry::from_definitions(sample_tools()).format_for_prompt();
        assert!(prompt.starts_with("<tools>\n"));
        assert!(prompt.ends_with("</tools>"));
        assert!(prompt.contains("## run_shell_command"));
        assert!(prompt.contains("Invocation: use ```bash fenced block"));
        assert!(prompt.contains("\"tool_id\": \"word_count\""));
        assert!(prompt.contains("Requires user confirmation"));
    }

    #[test]
    fn format_for_prompt_params() {
        let prompt = ToolRegistry::from_definitions(sample_tools()).format_for_prompt();
        assert!(prompt.contains("  - command: Command line to run (string, required)"));
        assert!(
            prompt.contains("(integer, optional)"),
            "Option<u32> should render as integer: {prompt}"
        );
    }
}
