//! Restricted global namespace handed to the python engine.

use std::collections::BTreeMap;

use adorable_policy::PythonPolicy;
use serde::Serialize;

/// Pure, non-reflective builtins. Nothing here reads or writes state,
/// imports, or inspects frames.
pub const SAFE_BUILTINS: &[&str] = &[
    "abs",
    "all",
    "any",
    "bin",
    "bool",
    "chr",
    "divmod",
    "enumerate",
    "filter",
    "float",
    "hex",
    "int",
    "len",
    "list",
    "map",
    "max",
    "min",
    "oct",
    "ord",
    "pow",
    "range",
    "reversed",
    "round",
    "sorted",
    "str",
    "sum",
    "tuple",
    "type",
    "zip",
    "print",
];

pub const CONSTANTS: &[(&str, f64)] = &[("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

/// Whether user code may `import name`.
///
/// The top-level package must be on the safe list, and neither the full
/// dotted name nor any of its prefixes may be on the dangerous list.
#[must_use]
pub fn is_import_allowed(name: &str, policy: &PythonPolicy) -> bool {
    let base = name.split('.').next().unwrap_or_default();
    !base.is_empty() && policy.safe_modules.contains(base) && !policy.is_module_dangerous(name)
}

/// Description of the globals user code runs against.
///
/// The engine materializes it inside the interpreter: modules listed in
/// `preload` that are not installed there are skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Namespace {
    pub builtins: Vec<&'static str>,
    pub allowed_modules: Vec<String>,
    pub denied_modules: Vec<String>,
    pub preload: Vec<String>,
    pub constants: BTreeMap<&'static str, f64>,
}

impl Namespace {
    #[must_use]
    pub fn allows_import(&self, name: &str) -> bool {
        let base = name.split('.').next().unwrap_or_default();
        if !self.allowed_modules.iter().any(|m| m == base) {
            return false;
        }
        let mut prefix = String::new();
        for part in name.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            if self.denied_modules.contains(&prefix) {
                return false;
            }
        }
        true
    }
}

/// Build the restricted namespace for `policy`.
#[must_use]
pub fn build(policy: &PythonPolicy) -> Namespace {
    let allowed: Vec<String> = policy
        .safe_modules
        .iter()
        .filter(|m| is_import_allowed(m, policy))
        .cloned()
        .collect();

    Namespace {
        builtins: SAFE_BUILTINS.to_vec(),
        preload: allowed.clone(),
        allowed_modules: allowed,
        denied_modules: policy.dangerous_modules.iter().cloned().collect(),
        constants: CONSTANTS.iter().copied().collect(),
    }
}
