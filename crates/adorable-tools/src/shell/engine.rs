use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use adorable_policy::ExecutionPolicy;
use tokio::process::Command;

use crate::context::ExecutionContext;

pub const DEFAULT_TAIL: usize = 100;

/// How the validated command reaches the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Spawn the first word directly with the rest as arguments.
    Argv(Vec<String>),
    /// Hand the raw line to `sh -c`. Only used when the policy permits the
    /// operators the line contains.
    Shell(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ShellRequest<'a> {
    pub invocation: &'a Invocation,
    pub tail: usize,
    pub context: &'a ExecutionContext,
}

/// Runs validated shell commands.
pub trait ShellEngine: Send + Sync {
    fn run(&self, request: ShellRequest<'_>) -> impl Future<Output = String> + Send;
}

/// Spawns one child process per command with a hard timeout.
#[derive(Debug, Clone)]
pub struct ProcessShellEngine {
    timeout: Duration,
}

impl ProcessShellEngine {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn from_policy(policy: &ExecutionPolicy) -> Self {
        Self::new(Duration::from_secs(policy.max_execution_time))
    }
}

impl ShellEngine for ProcessShellEngine {
    async fn run(&self, request: ShellRequest<'_>) -> String {
        let mut cmd = match request.invocation {
            Invocation::Argv(argv) => {
                let Some((program, args)) = argv.split_first() else {
                    return "Error: empty command".to_owned();
                };
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Invocation::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                cmd
            }
        };

        let child = cmd
            .current_dir(working_dir(request.context))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => return format!("Error: {e}"),
        };

        let timeout_secs = self.timeout.as_secs();
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return format!("Error: {e}"),
            Err(_) => return format!("Error: execution timed out after {timeout_secs}s"),
        };

        if output.status.success() {
            tail_lines(&String::from_utf8_lossy(&output.stdout), request.tail)
        } else {
            format!("Error: {}", String::from_utf8_lossy(&output.stderr))
        }
    }
}

fn working_dir(context: &ExecutionContext) -> PathBuf {
    if context.working_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        context.working_dir.clone()
    }
}

/// Last `tail` lines of `output`. A `tail` of zero keeps everything.
#[must_use]
pub fn tail_lines(output: &str, tail: usize) -> String {
    let trimmed = output.strip_suffix('\n').unwrap_or(output);
    let lines: Vec<&str> = trimmed.split('\n').collect();
    let start = if tail == 0 {
        0
    } else {
        lines.len().saturating_sub(tail)
    };
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn context(dir: &Path) -> ExecutionContext {
        ExecutionContext::new(dir.to_path_buf())
    }

    fn argv(words: &[&str]) -> Invocation {
        Invocation::Argv(words.iter().map(|w| (*w).to_owned()).collect())
    }

    async fn run(engine: &ProcessShellEngine, invocation: &Invocation, dir: &Path) -> String {
        engine
            .run(ShellRequest {
                invocation,
                tail: DEFAULT_TAIL,
                context: &context(dir),
            })
            .await
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("a\nb\nc", 5), "a\nb\nc");
        assert_eq!(tail_lines("a\nb\nc\n", 0), "a\nb\nc");
        assert_eq!(tail_lines("", 3), "");
    }

    #[tokio::test]
    async fn runs_argv_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let out = run(&engine, &argv(&["ls"]), dir.path()).await;
        assert!(out.contains("marker.txt"), "{out}");
    }

    #[tokio::test]
    async fn argv_does_not_interpret_operators() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let out = run(&engine, &argv(&["echo", "a", "|", "b"]), dir.path()).await;
        assert_eq!(out, "a | b");
    }

    #[tokio::test]
    async fn shell_invocation_applies_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let out = run(
            &engine,
            &Invocation::Shell("printf 'x\\ny\\n' | tail -n 1".into()),
            dir.path(),
        )
        .await;
        assert_eq!(out, "y");
    }

    #[tokio::test]
    async fn tail_applied_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let inv = Invocation::Shell("printf '1\\n2\\n3\\n4\\n'".into());
        let out = engine
            .run(ShellRequest {
                invocation: &inv,
                tail: 2,
                context: &context(dir.path()),
            })
            .await;
        assert_eq!(out, "3\n4");
    }

    #[tokio::test]
    async fn nonzero_exit_returns_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let out = run(&engine, &argv(&["ls", "does-not-exist"]), dir.path()).await;
        assert!(out.starts_with("Error: "), "{out}");
        assert!(out.contains("does-not-exist"));
    }

    #[tokio::test]
    async fn spawn_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let out = run(&engine, &argv(&["no-such-binary-xyz"]), dir.path()).await;
        assert!(out.starts_with("Error: "));
    }

    #[tokio::test]
    async fn empty_argv_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(10));
        let out = run(&engine, &Invocation::Argv(Vec::new()), dir.path()).await;
        assert_eq!(out, "Error: empty command");
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessShellEngine::new(Duration::from_secs(1));
        let out = run(&engine, &argv(&["sleep", "5"]), dir.path()).await;
        assert_eq!(out, "Error: execution timed out after 1s");
    }
}
