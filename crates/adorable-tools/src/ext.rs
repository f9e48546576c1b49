//! User-supplied extension tools.
//!
//! Each `*.toml` file in the extension directory describes one tool:
//!
//! ```toml
//! name = "word_count"
//! description = "Count lines, words and bytes of a file"
//! command = "wc"
//! ```
//!
//! Calls append the caller's `args` to `command` and go through
//! [`SecureShellTool`], so extensions obey the same shell policy and need
//! the same confirmation as `run_shell_command`.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;

use crate::executor::{ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params};
use crate::registry::{InvocationHint, ToolDef};
use crate::secure_shell::{self, SecureShellTool};
use crate::shell::{ProcessShellEngine, ShellEngine};

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtensionManifest {
    pub name: String,
    pub description: String,
    pub command: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtensionParams {
    /// Extra arguments appended to the tool's command
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExtensionManifest {
    /// Full command line for one call.
    #[must_use]
    pub fn command_line(&self, args: &[String]) -> String {
        if args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, shell_words::join(args))
        }
    }
}

/// Parse and check one manifest file.
///
/// # Errors
///
/// Returns `ExtensionError` if the file cannot be read, is not valid TOML,
/// or has an unusable name or command.
pub fn load_manifest(path: &Path) -> Result<ExtensionManifest, ExtensionError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ExtensionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: ExtensionManifest =
        toml::from_str(&raw).map_err(|source| ExtensionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let invalid = |message: &str| ExtensionError::Invalid {
        path: path.to_path_buf(),
        message: message.to_owned(),
    };
    if manifest.name.is_empty()
        || !manifest
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("name must be non-empty ASCII letters, digits, '_' or '-'"));
    }
    if manifest.command.trim().is_empty() {
        return Err(invalid("command must not be empty"));
    }
    Ok(manifest)
}

/// Extension manifests keyed by tool name.
#[derive(Debug, Default, Clone)]
pub struct ExtensionRegistry {
    tools: Vec<ExtensionManifest>,
}

impl ExtensionRegistry {
    /// Scan `dir` for `*.toml` manifests in file-name order.
    ///
    /// Names starting with `_` or `.` are ignored. Invalid manifests and
    /// duplicate names are logged with `tracing::warn` and skipped; the first
    /// manifest for a name wins.
    pub fn load(dir: &Path) -> Self {
        let mut registry = Self::default();
        let pattern = dir.join("*.toml");
        let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
            tracing::warn!("invalid extension directory: {}", dir.display());
            return registry;
        };

        for path in paths.flatten() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('_') || n.starts_with('.'));
            if hidden || !path.is_file() {
                continue;
            }
            match load_manifest(&path) {
                Ok(manifest) => {
                    if registry.get(&manifest.name).is_some() {
                        tracing::warn!(
                            "skipping {}: duplicate extension '{}'",
                            path.display(),
                            manifest.name
                        );
                        continue;
                    }
                    tracing::debug!("loaded extension tool '{}'", manifest.name);
                    registry.tools.push(manifest);
                }
                Err(e) => tracing::warn!("skipping extension: {e}"),
            }
        }
        registry
    }

    #[must_use]
    pub fn all(&self) -> &[ExtensionManifest] {
        &self.tools
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExtensionManifest> {
        self.tools.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Exposes every registered extension as a structured tool call.
#[derive(Debug)]
pub struct ExtensionExecutor<E = ProcessShellEngine> {
    registry: ExtensionRegistry,
    shell: SecureShellTool<E>,
}

impl<E: ShellEngine> ExtensionExecutor<E> {
    #[must_use]
    pub fn new(registry: ExtensionRegistry, shell: SecureShellTool<E>) -> Self {
        Self { registry, shell }
    }

    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }
}

impl<E: ShellEngine> ToolExecutor for ExtensionExecutor<E> {
    async fn execute(&self, _response: &str) -> Result<Option<ToolOutput>, ToolError> {
        Ok(None)
    }

    fn tool_definitions(&self) -> Vec<ToolDef> {
        let confirm = self.shell.policy().execution.confirm_mode;
        self.registry
            .all()
            .iter()
            .map(|m| ToolDef {
                requires_confirmation: confirm.requires_confirmation(secure_shell::TOOL_ID),
                ..ToolDef::new(
                    m.name.clone(),
                    m.description.clone(),
                    schemars::schema_for!(ExtensionParams),
                    InvocationHint::ToolCall,
                    confirm,
                )
            })
            .collect()
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        let Some(manifest) = self.registry.get(&call.tool_id) else {
            return Ok(None);
        };
        let params: ExtensionParams = deserialize_params(&call.params)?;
        let command = manifest.command_line(&params.args);
        let summary = self.shell.run_shell_command(&command, None).await;
        Ok(Some(ToolOutput {
            tool_name: manifest.name.clone(),
            summary,
            blocks_executed: 1,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use adorable_policy::SecurityPolicy;

    use super::*;
    use crate::shell::{Invocation, ShellRequest};

    fn write(dir: &Path, file: &str, body: &str) {
        std::fs::write(dir.join(file), body).unwrap();
    }

    #[derive(Debug, Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<Invocation>>,
    }

    impl ShellEngine for RecordingEngine {
        async fn run(&self, request: ShellRequest<'_>) -> String {
            self.calls.lock().unwrap().push(request.invocation.clone());
            "3 12 80 notes.txt".to_owned()
        }
    }

    fn executor(dir: &Path) -> ExtensionExecutor<RecordingEngine> {
        let shell = SecureShellTool::new(
            Arc::new(SecurityPolicy::default()),
            RecordingEngine::default(),
        )
        .without_audit();
        ExtensionExecutor::new(ExtensionRegistry::load(dir), shell)
    }

    fn call(tool: &str, args: serde_json::Value) -> ToolCall {
        let mut params = HashMap::new();
        params.insert("args".to_owned(), args);
        ToolCall {
            tool_id: tool.to_owned(),
            params,
        }
    }

    #[test]
    fn load_from_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "wc.toml",
            "name = \"word_count\"\ndescription = \"Count words\"\ncommand = \"wc\"\n",
        );
        let registry = ExtensionRegistry::load(dir.path());
        assert_eq!(registry.all().len(), 1);
        assert_eq!(registry.get("word_count").unwrap().command, "wc");
    }

    #[test]
    fn skips_invalid_hidden_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.toml", "name = \"dup\"\ndescription = \"first\"\ncommand = \"ls\"\n");
        write(dir.path(), "b.toml", "name = \"dup\"\ndescription = \"second\"\ncommand = \"pwd\"\n");
        write(dir.path(), "c.toml", "not toml at all [");
        write(dir.path(), "d.toml", "name = \"bad name\"\ndescription = \"x\"\ncommand = \"ls\"\n");
        write(dir.path(), "e.toml", "name = \"empty\"\ndescription = \"x\"\ncommand = \"  \"\n");
        write(dir.path(), "_draft.toml", "name = \"draft\"\ndescription = \"x\"\ncommand = \"ls\"\n");
        write(dir.path(), "notes.txt", "name = \"txt\"");

        let registry = ExtensionRegistry::load(dir.path());
        assert_eq!(registry.all().len(), 1);
        assert_eq!(registry.get("dup").unwrap().description, "first");
        assert!(registry.get("draft").is_none());
    }

    #[test]
    fn missing_directory_is_empty() {
        let registry = ExtensionRegistry::load(Path::new("/nonexistent/adorable/tools"));
        assert!(registry.is_empty());
    }

    #[test]
    fn manifest_errors_are_descriptive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.toml");
        std::fs::write(&path, "name = 1").unwrap();
        assert!(matches!(load_manifest(&path), Err(ExtensionError::Parse { .. })));
        let missing = load_manifest(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ExtensionError::Read { .. })));
    }

    #[test]
    fn command_line_quotes_args() {
        let m = ExtensionManifest {
            name: "grep_notes".into(),
            description: String::new(),
            command: "grep -n".into(),
        };
        assert_eq!(m.command_line(&[]), "grep -n");
        assert_eq!(
            m.command_line(&["two words".into(), "notes.txt".into()]),
            "grep -n 'two words' notes.txt"
        );
    }

    #[tokio::test]
    async fn calls_go_through_secure_shell() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "wc.toml",
            "name = \"word_count\"\ndescription = \"Count words\"\ncommand = \"wc\"\n",
        );
        let exec = executor(dir.path());

        let out = exec
            .execute_tool_call(&call("word_count", serde_json::json!(["notes.txt"])))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.tool_name, "word_count");
        assert_eq!(out.summary, "3 12 80 notes.txt");
        assert_eq!(
            exec.shell.engine().calls.lock().unwrap().clone(),
            vec![Invocation::Argv(vec!["wc".into(), "notes.txt".into()])]
        );
    }

    #[tokio::test]
    async fn extension_commands_obey_shell_policy() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "fetch.toml",
            "name = \"fetch\"\ndescription = \"Download\"\ncommand = \"curl -s\"\n",
        );
        let exec = executor(dir.path());
        let out = exec
            .execute_tool_call(&call("fetch", serde_json::json!(["http://example.com"])))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            out.summary,
            "Error: Security validation failed: Command 'curl' is not in allowed list"
        );
        assert!(exec.shell.engine().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_not_handled() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let result = exec
            .execute_tool_call(&call("word_count", serde_json::json!([])))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(exec.execute("```bash\nls\n```").await.unwrap().is_none());
    }

    #[test]
    fn definitions_per_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.toml", "name = \"a\"\ndescription = \"A tool\"\ncommand = \"ls\"\n");
        write(dir.path(), "b.toml", "name = \"b\"\ndescription = \"B tool\"\ncommand = \"pwd\"\n");
        let defs = executor(dir.path()).tool_definitions();
        let ids: Vec<&str> = defs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(defs.iter().all(|d| d.invocation == InvocationHint::ToolCall));
        assert!(defs.iter().all(|d| d.requires_confirmation));
    }
}
