//! Python code execution: lexical filter, restricted namespace, interpreter engine.

pub mod engine;
pub mod namespace;
pub mod validator;

pub use engine::{ProcessPythonEngine, PythonEngine, PythonRequest, resolve_interpreter};
pub use namespace::{Namespace, is_import_allowed};
pub use validator::validate;
