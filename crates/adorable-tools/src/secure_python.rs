//! Policy-enforcing front door for python code submitted by the agent.

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
use crate::python::{self, ProcessPythonEngine, PythonEngine, PythonRequest};
use crate::registry::{InvocationHint, ToolDef};

pub const TOOL_ID: &str = "execute_python_code";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PythonParams {
    /// Python source to run in the restricted namespace
    pub code: String,
    /// Name of a variable whose final value should be returned
    pub variable_to_return: Option<String>,
}

/// Validates python code against the policy, runs it through a
/// [`PythonEngine`] and records the attempt in the audit log.
///
/// Every outcome is a string: engine output, `Error: ...`, or an
/// `[AUDIT MODE]` echo.
#[derive(Debug, Clone)]
pub struct SecurePythonTool<E = ProcessPythonEngine> {
    policy: Arc<SecurityPolicy>,
    engine: E,
    audit: Option<AuditLogger>,
    base_dir: PathBuf,
}

impl SecurePythonTool<ProcessPythonEngine> {
    #[must_use]
    pub fn from_policy(policy: Arc<SecurityPolicy>) -> Self {
        let engine = ProcessPythonEngine::from_policy(&policy.execution);
        Self::new(policy, engine)
    }
}

impl<E: PythonEngine> SecurePythonTool<E> {
    /// Audit logging defaults to `<audit_dir>/python_execution.log` when
    /// `log_executions` is on.
    #[must_use]
    pub fn new(policy: Arc<SecurityPolicy>, engine: E) -> Self {
        let audit = policy
            .execution
            .log_executions
            .then(|| AuditLogger::for_kind(&policy.execution.audit_dir(), AuditKind::Python));
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

    pub async fn execute_python_code(&self, code: &str, variable_to_return: Option<&str>) -> String {
        if self.policy.execution.audit_mode {
            tracing::info!("audit mode, python code not executed");
            return format!("[AUDIT MODE] Would execute Python code:\n{code}");
        }

        let mut ctx = ExecutionContext::new(self.base_dir.clone());
        let span = tracing::info_span!("secure_exec", kind = "python", execution_id = %ctx.execution_id);
        async {
            let verdict = python::validate(code, &self.policy.python);
            if !verdict.is_safe {
                tracing::warn!(reason = %verdict.reason, "python code rejected");
                ctx.finish();
                self.log(&AuditRecord::blocked(AuditKind::Python, code, &verdict.reason, &ctx))
                    .await;
                return format!("Error: Security validation failed: {}", verdict.reason);
            }

            let namespace = python::namespace::build(&self.policy.python);
            let output = self
                .engine
                .run(PythonRequest {
                    code,
                    namespace: &namespace,
                    variable_to_return,
                    context: &ctx,
                })
                .await;
            ctx.finish();
            tracing::debug!(duration_ms = ctx.duration_ms(), "python code executed");

            self.log(&AuditRecord::executed(AuditKind::Python, code, &output, &ctx))
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

impl<E: PythonEngine> ToolExecutor for SecurePythonTool<E> {
    async fn execute(&self, response: &str) -> Result<Option<ToolOutput>, ToolError> {
        let blocks = extract_fenced_blocks(response, "python");
        if blocks.is_empty() {
            return Ok(None);
        }

        let mut outputs = Vec::with_capacity(blocks.len());
        for block in &blocks {
            outputs.push(self.execute_python_code(block, None).await);
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
            "Run Python code in a restricted namespace and return its output",
            schemars::schema_for!(PythonParams),
            InvocationHint::FencedBlock("python"),
            self.policy.execution.confirm_mode,
        )]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        if call.tool_id != TOOL_ID {
            return Ok(None);
        }
        let params: PythonParams = deserialize_params(&call.params)?;
        let summary = self
            .execute_python_code(&params.code, params.variable_to_return.as_deref())
            .await;
        Ok(Some(ToolOutput {
            tool_name: TOOL_ID.to_owned(),
            summary,
            blocks_executed: 1,
        }))
    }
}
