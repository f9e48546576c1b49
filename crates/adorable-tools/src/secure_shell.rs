use std::path::PathBuf;
use std::sync::Arc;

use adorable_policy::SecurityPolicy;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::Instrument;

use crate::audit::{AuditKind, AuditLogger, AuditRecord};
use crate::context::ExecutionContext;
use crate::executor::{
    ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params, extract_fenced_blocks,
};
use crate::registry::{InvocationHint, ToolDef};
use crate::shell::{self, DEFAULT_TAIL, Invocation, ProcessShellEngine, ShellEngine, ShellRequest};
use crate::validation::Violation;

pub const TOOL_ID: &str = "run_shell_command";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ShellParams {
    /// Command line to run; the first word must be an allowed command
    pub command: String,
    /// Number of trailing output lines to return (default 100)
    pub tail: Option<usize>,
}

/// Shell counterpart of [`crate::SecurePythonTool`].
#[derive(Debug, Clone)]
pub struct SecureShellTool<E = ProcessShellEngine> {
    policy: Arc<SecurityPolicy>,
    engine: E,
    audit: Option<AuditLogger>,
    base_dir: PathBuf,
}

impl SecureShellTool<ProcessShellEngine> {
    #[must_use]
    pub fn from_policy(policy: Arc<SecurityPolicy>) -> Self {
        let engine = ProcessShellEngine::from_policy(&policy.execution);
        Self::new(policy, engine)
    }
}

impl<E: ShellEngine> SecureShellTool<E> {
    #[must_use]
    pub fn new(policy: Arc<SecurityPolicy>, engine: E) -> Self {
        let audit = policy
            .execution
            .log_executions
            .then(|| AuditLogger::for_kind(&policy.execution.audit_dir(), AuditKind::Shell));
        Self {
            policy,
            engine,
            audit,
            base_dir: PathBuf::from("."),
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    #[must_use]
    pub fn without_audit(mut self) -> Self {
        self.audit = None;
        self
    }

    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    #[must_use]
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn run_shell_command(&self, command: &str, tail: Option<usize>) -> String {
        if self.policy.execution.audit_mode {
            tracing::info!("audit mode, shell command not executed");
            return format!("[AUDIT MODE] Would execute shell command: {command}");
        }

        let mut ctx = ExecutionContext::new(self.base_dir.clone());
        let span = tracing::info_span!("secure_exec", kind = "shell", execution_id = %ctx.execution_id);
        async {
            let verdict = shell::validate(command, &self.policy.shell);
            if !verdict.is_safe {
                tracing::warn!(reason = %verdict.reason, "shell command rejected");
                ctx.finish();
                self.log(&AuditRecord::blocked(AuditKind::Shell, command, &verdict.reason, &ctx))
                    .await;
                return format!("Error: Security validation failed: {}", verdict.reason);
            }

            let output = match invocation(command) {
                Ok(invocation) => {
                    self.engine
                        .run(ShellRequest {
                            invocation: &invocation,
                            tail: tail.unwrap_or(DEFAULT_TAIL),
                            context: &ctx,
                        })
                        .await
                }
                Err(e) => format!("Error: {e}"),
            };
            ctx.finish();
            tracing::debug!(duration_ms = ctx.duration_ms(), "shell command executed");

            self.log(&AuditRecord::executed(AuditKind::Shell, command, &output, &ctx))
                .await;
            output
        }
        .instrument(span)
        .await
    }

    async fn log(&self, record: &AuditRecord) {
        if let Some(ref logger) = self.audit {
            logger.log(record).await;
        }
    }
}

/// Operators only survive validation when the policy allows them and every
/// stage is an allowed program; they need `sh` to take effect.
fn invocation(command: &str) -> Result<Invocation, Violation> {
    if shell::uses_shell_operators(command) {
        Ok(Invocation::Shell(command.to_owned()))
    } else {
        shell::tokenize(command).map(Invocation::Argv)
    }
}

impl<E: ShellEngine> ToolExecutor for SecureShellTool<E> {
    async fn execute(&self, response: &str) -> Result<Option<ToolOutput>, ToolError> {
        let blocks = extract_fenced_blocks(response, "bash");
        if blocks.is_empty() {
            return Ok(None);
        }

        let mut outputs = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let out = self.run_shell_command(block, None).await;
            outputs.push(format!("$ {block}\n{out}"));
        }

        #[allow(clippy::cast_possible_truncation)]
        let blocks_executed = blocks.len() as u32;
        Ok(Some(ToolOutput {
            tool_name: TOOL_ID.to_owned(),
            summary: outputs.join("\n\n"),
            blocks_executed,
        }))
    }

    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![ToolDef::new(
            TOOL_ID,
            "Run an allow-listed shell command and return the tail of its output",
            schemars::schema_for!(ShellParams),
            InvocationHint::FencedBlock("bash"),
            self.policy.execution.confirm_mode,
        )]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        if call.tool_id != TOOL_ID {
            return Ok(None);
        }
        let params: ShellParams = deserialize_params(&call.params)?;
        let summary = self.run_shell_command(&params.command, params.tail).await;
        Ok(Some(ToolOutput {
            tool_name: TOOL_ID.to_owned(),
            summary,
            blocks_executed: 1,
        }))
    }
}
