//! Line-oriented lexical filter for python source.
//!
//! Matching is plain substring search: `myeval(` trips the `eval` rule and a
//! string literal containing `exec(` is rejected like a call. The filter is one
//! layer; the restricted namespace is the other.

use adorable_policy::PythonPolicy;

use crate::validation::{ValidationResult, Violation};

const FILE_OPERATIONS: &[&str] = &["open(", "file(", "with open"];

/// Scan `code` against `policy` and return the first violation found.
#[must_use]
pub fn validate(code: &str, policy: &PythonPolicy) -> ValidationResult {
    match check(code, policy) {
        Ok(()) => ValidationResult::passed("Code safety validation passed"),
        Err(violation) => ValidationResult::rejected(violation),
    }
}

fn check(code: &str, policy: &PythonPolicy) -> Result<(), Violation> {
    for (idx, raw) in code.split('\n').enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = idx + 1;

        if let Some(name) = find_dangerous_call(line, policy) {
            return Err(Violation::DangerousFunction {
                name: name.to_owned(),
                line: line_no,
            });
        }

        if let Some(name) = find_dangerous_import(line, policy) {
            return Err(Violation::DangerousImport {
                name: name.to_owned(),
                line: line_no,
            });
        }

        if !policy.allow_file_operations && FILE_OPERATIONS.iter().any(|op| line.contains(op)) {
            return Err(Violation::FileOperation { line: line_no });
        }
    }
    Ok(())
}

fn find_dangerous_call<'p>(line: &str, policy: &'p PythonPolicy) -> Option<&'p str> {
    policy
        .dangerous_functions
        .iter()
        .find(|name| line.contains(&format!("{name}(")))
        .map(String::as_str)
}

fn find_dangerous_import<'p>(line: &str, policy: &'p PythonPolicy) -> Option<&'p str> {
    policy
        .dangerous_modules
        .iter()
        .find(|module| {
            [
                format!("import {module}"),
                format!("from {module}"),
                format!("import {module} as"),
            ]
            .iter()
            .any(|pattern| line.contains(pattern.as_str()))
        })
        .map(String::as_str)
}
