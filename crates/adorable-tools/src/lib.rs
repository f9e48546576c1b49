//! Policy-gated python and shell execution tools for LLM agents.

pub mod audit;
pub mod composite;
pub mod context;
pub mod executor;
pub mod ext;
pub mod python;
pub mod registry;
pub mod secure_python;
pub mod secure_shell;
pub mod shell;
pub mod validation;

pub use audit::{AuditKind, AuditLogger, AuditRecord};
pub use composite::CompositeExecutor;
pub use context::ExecutionContext;
pub use executor::{ToolCall, ToolError, ToolExecutor, ToolOutput};
pub use ext::{ExtensionExecutor, ExtensionRegistry};
pub use registry::{InvocationHint, ToolDef, ToolRegistry};
pub use secure_python::SecurePythonTool;
pub use secure_shell::SecureShellTool;
pub use validation::{ValidationResult, Violation};
