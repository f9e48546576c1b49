use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const SAFE_MODULES: &[&str] = &[
    // data science
    "pandas",
    "numpy",
    "matplotlib",
    "seaborn",
    "scipy",
    "sklearn",
    // standard library
    "json",
    "csv",
    "re",
    "datetime",
    "collections",
    "math",
    "statistics",
    "random",
    "itertools",
    "pathlib",
    "typing",
    "dataclasses",
    "fractions",
    "decimal",
    "string",
    // visualization
    "plotly",
    "bokeh",
    "altair",
];

const DANGEROUS_MODULES: &[&str] = &[
    "subprocess",
    "os.system",
    "eval",
    "exec",
    "compile",
    "importlib",
    "__import__",
    "globals",
    "locals",
    "vars",
    "socket",
    "urllib",
    "requests",
    "http",
    "ftplib",
    "shutil",
    "tempfile",
    "glob",
    "fnmatch",
    "ctypes",
    "sys",
    "platform",
    "pwd",
    "grp",
    "pip",
    "setuptools",
    "conda",
    "pkg_resources",
];

const DANGEROUS_FUNCTIONS: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "__import__",
    "open",
    "file",
    "input",
    "raw_input",
    "reload",
    "help",
];

const ALLOWED_FILE_PATHS: &[&str] = &["./data", "./results", "."];

const ALLOWED_COMMANDS: &[&str] = &[
    // text processing
    "cat",
    "head",
    "tail",
    "grep",
    "awk",
    "sed",
    "sort",
    "uniq",
    "cut",
    "wc",
    "tr",
    "split",
    "join",
    "nl",
    // read-only system information
    "ls",
    "pwd",
    "whoami",
    "date",
    "uptime",
    "df",
    "du",
    // archives
    "tar",
    "zip",
    "unzip",
    "gzip",
    "gunzip",
    // text display
    "echo",
    "printf",
    "tee",
];

const BLOCKED_COMMANDS: &[&str] = &[
    // system management
    "rm",
    "mv",
    "cp",
    "chmod",
    "chown",
    "sudo",
    "su",
    "kill",
    "killall",
    "pkill",
    "systemctl",
    "service",
    // networking
    "curl",
    "wget",
    "nc",
    "netcat",
    "ssh",
    "scp",
    "rsync",
    "ping",
    "traceroute",
    "nslookup",
    "dig",
    // package management
    "pip",
    "pip3",
    "conda",
    "apt",
    "yum",
    "dnf",
    "brew",
    // toolchains and interpreters
    "gcc",
    "g++",
    "make",
    "cmake",
    "python",
    "python3",
    // power control
    "reboot",
    "shutdown",
    "halt",
    "poweroff",
    "init",
];

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

/// Complete sandbox policy: execution limits plus the python and shell rule sets.
///
/// Built once per process (see [`crate::PolicyStore`]) and shared read-only.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityPolicy {
    pub execution: ExecutionPolicy,
    pub python: PythonPolicy,
    pub shell: ShellPolicy,
}

/// How the calling agent framework should gate tool calls on user approval.
///
/// The legacy value `"off"` is read as [`ConfirmMode::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    Normal,
    #[default]
    #[serde(alias = "off")]
    Auto,
}

const CODE_EXECUTION_TOOLS: &[&str] = &[
    "execute_python_code",
    "run_python_code",
    "run_shell_command",
];

impl ConfirmMode {
    /// Whether a tool with this name must be confirmed before it runs.
    #[must_use]
    pub fn requires_confirmation(self, tool_name: &str) -> bool {
        if CODE_EXECUTION_TOOLS.contains(&tool_name) {
            return true;
        }
        self == Self::Normal && tool_name == "save_file"
    }
}

fn default_max_execution_time() -> u64 {
    30
}

fn default_max_memory_mb() -> u64 {
    512
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/adorable_secure_exec")
}

/// Limits and switches shared by both tools.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionPolicy {
    #[serde(default = "default_true")]
    pub use_pipx_python: bool,
    /// Seconds before the engine kills a running execution.
    #[serde(default = "default_max_execution_time")]
    pub max_execution_time: u64,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default)]
    pub audit_mode: bool,
    #[serde(default = "default_true")]
    pub log_executions: bool,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_true")]
    pub cleanup_temp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,
    #[serde(default)]
    pub confirm_mode: ConfirmMode,
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            use_pipx_python: true,
            max_execution_time: default_max_execution_time(),
            max_memory_mb: default_max_memory_mb(),
            audit_mode: false,
            log_executions: true,
            temp_dir: default_temp_dir(),
            cleanup_temp: true,
            python_interpreter: None,
            audit_dir: None,
            confirm_mode: ConfirmMode::default(),
        }
    }
}

impl ExecutionPolicy {
    /// Directory holding the per-kind audit logs; `~/.adorable` unless overridden.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.audit_dir.clone().unwrap_or_else(crate::adorable_home)
    }
}

/// Rules for python code submitted by the agent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PythonPolicy {
    pub safe_modules: BTreeSet<String>,
    pub dangerous_modules: BTreeSet<String>,
    pub dangerous_functions: BTreeSet<String>,
    pub allow_file_operations: bool,
    pub allowed_file_paths: BTreeSet<PathBuf>,
}

impl Default for PythonPolicy {
    fn default() -> Self {
        Self {
            safe_modules: names(SAFE_MODULES),
            dangerous_modules: names(DANGEROUS_MODULES),
            dangerous_functions: names(DANGEROUS_FUNCTIONS),
            allow_file_operations: false,
            allowed_file_paths: ALLOWED_FILE_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl PythonPolicy {
    /// True when `name`, or any dotted prefix of it, is listed as dangerous.
    #[must_use]
    pub fn is_module_dangerous(&self, name: &str) -> bool {
        let mut prefix = String::with_capacity(name.len());
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                prefix.push('.');
            }
            prefix.push_str(part);
            if self.dangerous_modules.contains(&prefix) {
                return true;
            }
        }
        false
    }

    /// Safe modules that are not overridden by the dangerous list.
    pub fn importable_modules(&self) -> impl Iterator<Item = &str> {
        self.safe_modules
            .iter()
            .filter(|m| !self.is_module_dangerous(m))
            .map(String::as_str)
    }
}

/// Rules for shell commands submitted by the agent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellPolicy {
    pub allowed_commands: BTreeSet<String>,
    pub blocked_commands: BTreeSet<String>,
    pub allow_pipes: bool,
    pub allow_redirection: bool,
    pub allow_background: bool,
}

impl Default for ShellPolicy {
    fn default() -> Self {
        Self {
            allowed_commands: names(ALLOWED_COMMANDS),
            blocked_commands: names(BLOCKED_COMMANDS),
            allow_pipes: false,
            allow_redirection: false,
            allow_background: false,
        }
    }
}

impl ShellPolicy {
    #[must_use]
    pub fn is_command_allowed(&self, command: &str) -> bool {
        self.allowed_commands.contains(command) && !self.blocked_commands.contains(command)
    }
}
