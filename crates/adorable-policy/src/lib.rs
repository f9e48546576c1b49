//! Layered security policy for the adorable execution sandbox.

mod env;
pub mod error;
pub mod merge;
pub mod store;
pub mod types;


use std::path::PathBuf;

pub use error::PolicyError;
pub use store::{PolicySource, PolicyStore};
pub use types::{ConfirmMode, ExecutionPolicy, PythonPolicy, SecurityPolicy, ShellPolicy};

/// `~/.adorable`, falling back to `./.adorable` when no home directory is known.
#[must_use]
pub fn adorable_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".adorable")
}
