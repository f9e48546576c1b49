use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use adorable_policy::ExecutionPolicy;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::namespace::Namespace;
use crate::context::ExecutionContext;

const BOOTSTRAP: &str = include_str!("bootstrap.py");

const PIPX_VENV: &str = ".local/pipx/venvs/adorable-cli/bin/python";

/// One validated python execution.
#[derive(Debug, Clone, Copy)]
pub struct PythonRequest<'a> {
    pub code: &'a str,
    pub namespace: &'a Namespace,
    pub variable_to_return: Option<&'a str>,
    pub context: &'a ExecutionContext,
}

/// Runs validated python code against a restricted namespace.
///
/// Implementations return captured output as text and report their own
/// failures as strings starting with `Error: `.
pub trait PythonEngine: Send + Sync {
    fn run(&self, request: PythonRequest<'_>) -> impl Future<Output = String> + Send;
}

/// Interpreter selection: explicit setting, then the pipx venv, then `python3`.
#[must_use]
pub fn resolve_interpreter(policy: &ExecutionPolicy) -> String {
    if let Some(ref interpreter) = policy.python_interpreter {
        return interpreter.clone();
    }
    if policy.use_pipx_python
        && let Some(home) = dirs::home_dir()
    {
        let pipx = home.join(PIPX_VENV);
        if pipx.is_file() {
            return pipx.display().to_string();
        }
    }
    "python3".to_owned()
}

/// Runs each request in a fresh interpreter process fed through stdin.
#[derive(Debug, Clone)]
pub struct ProcessPythonEngine {
    interpreter: String,
    timeout: Duration,
    max_memory_mb: u64,
    temp_dir: PathBuf,
    cleanup_temp: bool,
}

impl ProcessPythonEngine {
    #[must_use]
    pub fn from_policy(policy: &ExecutionPolicy) -> Self {
        Self {
            interpreter: resolve_interpreter(policy),
            timeout: Duration::from_secs(policy.max_execution_time),
            max_memory_mb: policy.max_memory_mb,
            temp_dir: policy.temp_dir.clone(),
            cleanup_temp: policy.cleanup_temp,
        }
    }

    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    #[must_use]
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    async fn scratch_dir(&self, execution_id: &str) -> Option<PathBuf> {
        let dir = self.temp_dir.join(execution_id);
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => Some(dir),
            Err(e) => {
                tracing::warn!("failed to create scratch dir {}: {e}", dir.display());
                None
            }
        }
    }

    async fn spawn_and_wait(&self, request: &PythonRequest<'_>, scratch: Option<&Path>) -> String {
        let payload = serde_json::json!({
            "code": request.code,
            "namespace": request.namespace,
            "variable_to_return": request.variable_to_return,
            "max_memory_mb": self.max_memory_mb,
        });

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c")
            .arg(BOOTSTRAP)
            .current_dir(&request.context.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = scratch {
            cmd.env("TMPDIR", dir);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return format!(
                    "Error: failed to start python interpreter '{}': {e}",
                    self.interpreter
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(payload.to_string().as_bytes()).await {
                tracing::debug!("python engine stdin closed early: {e}");
            }
            drop(stdin);
        }

        let timeout_secs = self.timeout.as_secs();
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return format!("Error: {e}"),
            Err(_) => return format!("Error: execution timed out after {timeout_secs}s"),
        };

        if output.status.success() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                format!("Error: python interpreter exited with {}", output.status)
            } else {
                format!("Error: {stderr}")
            }
        }
    }
}

impl PythonEngine for ProcessPythonEngine {
    async fn run(&self, request: PythonRequest<'_>) -> String {
        let scratch = self.scratch_dir(&request.context.execution_id).await;
        let out = self.spawn_and_wait(&request, scratch.as_deref()).await;

        if self.cleanup_temp
            && let Some(dir) = scratch
            && let Err(e) = tokio::fs::remove_dir_all(&dir).await
        {
            tracing::debug!("failed to remove scratch dir {}: {e}", dir.display());
        }
        out
    }
}
