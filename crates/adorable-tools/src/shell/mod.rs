//! Shell command execution: tokenizer-backed validator and process engine.

pub mod engine;
pub mod validator;

pub use engine::{DEFAULT_TAIL, Invocation, ProcessShellEngine, ShellEngine, ShellRequest, tail_lines};
pub use validator::{tokenize, uses_shell_operators, validate};
