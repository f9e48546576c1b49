use std::fmt;

/// Why a validator rejected its input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("Dangerous function '{name}' found at line {line}")]
    DangerousFunction { name: String, line: usize },

    #[error("Dangerous module '{name}' import not allowed at line {line}")]
    DangerousImport { name: String, line: usize },

    #[error("File operation not allowed at line {line}")]
    FileOperation { line: usize },

    #[error("Empty command")]
    EmptyCommand,

    #[error("Command parsing error: {0}")]
    Parse(String),

    #[error("Command '{0}' is not in allowed list")]
    NotAllowed(String),

    #[error("Command '{0}' is blocked")]
    Blocked(String),

    #[error("Pipe operations are not allowed")]
    Pipe,

    #[error("Redirection operations are not allowed")]
    Redirection,

    #[error("Background execution is not allowed")]
    Background,

    #[error("Command chaining is not allowed")]
    Chaining,

    #[error("Command substitution is not allowed")]
    Substitution,

    #[error("Dangerous command pattern detected: {0}")]
    DangerousPattern(&'static str),
}

impl Violation {
    /// Malformed input rather than a policy decision.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::EmptyCommand | Self::Parse(_))
    }
}

/// Verdict of a static validator. Always produced, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_safe: bool,
    pub reason: String,
    pub violation: Option<Violation>,
}

impl ValidationResult {
    #[must_use]
    pub fn passed(reason: &str) -> Self {
        Self {
            is_safe: true,
            reason: reason.to_owned(),
            violation: None,
        }
    }

    #[must_use]
    pub fn rejected(violation: Violation) -> Self {
        Self {
            is_safe: false,
            reason: violation.to_string(),
            violation: Some(violation),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}
