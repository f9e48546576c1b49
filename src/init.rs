use std::path::PathBuf;

use adorable_policy::{ConfirmMode, PolicyStore, SecurityPolicy};
use dialoguer::{Confirm, Input, Select};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WizardState {
    pub(crate) audit_mode: bool,
    pub(crate) log_executions: bool,
    pub(crate) confirm_mode: ConfirmMode,
    pub(crate) max_execution_time: u64,
    pub(crate) max_memory_mb: u64,
    pub(crate) python_interpreter: Option<String>,
    pub(crate) allow_file_operations: bool,
    pub(crate) allow_pipes: bool,
    pub(crate) allow_redirection: bool,
    pub(crate) allow_background: bool,
    pub(crate) extra_commands: Vec<String>,
}

impl Default for WizardState {
    fn default() -> Self {
        let policy = SecurityPolicy::default();
        Self {
            audit_mode: policy.execution.audit_mode,
            log_executions: policy.execution.log_executions,
            confirm_mode: policy.execution.confirm_mode,
            max_execution_time: policy.execution.max_execution_time,
            max_memory_mb: policy.execution.max_memory_mb,
            python_interpreter: None,
            allow_file_operations: policy.python.allow_file_operations,
            allow_pipes: policy.shell.allow_pipes,
            allow_redirection: policy.shell.allow_redirection,
            allow_background: policy.shell.allow_background,
            extra_commands: Vec::new(),
        }
    }
}

pub fn run(output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("adorable init - security policy wizard\n");

    let mut state = WizardState::default();
    step_execution(&mut state)?;
    step_python(&mut state)?;
    step_shell(&mut state)?;
    step_review_and_write(&state, output)?;

    Ok(())
}

fn step_execution(state: &mut WizardState) -> anyhow::Result<()> {
    println!("== Step 1/4: Execution ==\n");

    state.audit_mode = Confirm::new()
        .with_prompt("Enable audit mode (validate only, never execute)?")
        .default(state.audit_mode)
        .interact()?;
    state.log_executions = Confirm::new()
        .with_prompt("Record every execution in the audit log?")
        .default(state.log_executions)
        .interact()?;

    let modes = ["auto (confirm code execution only)", "normal (also confirm file writes)"];
    let selection = Select::new()
        .with_prompt("Confirmation mode")
        .items(modes)
        .default(0)
        .interact()?;
    state.confirm_mode = if selection == 1 {
        ConfirmMode::Normal
    } else {
        ConfirmMode::Auto
    };

    state.max_execution_time = Input::new()
        .with_prompt("Execution timeout (seconds)")
        .default(state.max_execution_time)
        .validate_with(|v: &u64| if *v > 0 { Ok(()) } else { Err("must be positive") })
        .interact_text()?;
    state.max_memory_mb = Input::new()
        .with_prompt("Python memory limit (MB)")
        .default(state.max_memory_mb)
        .interact_text()?;

    println!();
    Ok(())
}

fn step_python(state: &mut WizardState) -> anyhow::Result<()> {
    println!("== Step 2/4: Python ==\n");

    let interpreter: String = Input::new()
        .with_prompt("Python interpreter (empty = auto-detect)")
        .default(String::new())
        .allow_empty(true)
        .interact_text()?;
    state.python_interpreter = Some(interpreter.trim().to_owned()).filter(|s| !s.is_empty());

    state.allow_file_operations = Confirm::new()
        .with_prompt("Allow python code to open files?")
        .default(state.allow_file_operations)
        .interact()?;

    println!();
    Ok(())
}

fn step_shell(state: &mut WizardState) -> anyhow::Result<()> {
    println!("== Step 3/4: Shell ==\n");

    state.allow_pipes = Confirm::new()
        .with_prompt("Allow pipes (|)?")
        .default(state.allow_pipes)
        .interact()?;
    state.allow_redirection = Confirm::new()
        .with_prompt("Allow redirection (> <)?")
        .default(state.allow_redirection)
        .interact()?;
    state.allow_background = Confirm::new()
        .with_prompt("Allow background jobs (&)?")
        .default(state.allow_background)
        .interact()?;

    let extra: String = Input::new()
        .with_prompt("Additional allowed commands (comma-separated)")
        .default(String::new())
        .allow_empty(true)
        .interact_text()?;
    state.extra_commands = parse_command_list(&extra);

    println!();
    Ok(())
}

pub(crate) fn parse_command_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn build_policy(state: &WizardState) -> SecurityPolicy {
    let mut policy = SecurityPolicy::default();

    policy.execution.audit_mode = state.audit_mode;
    policy.execution.log_executions = state.log_executions;
    policy.execution.confirm_mode = state.confirm_mode;
    policy.execution.max_execution_time = state.max_execution_time;
    policy.execution.max_memory_mb = state.max_memory_mb;
    policy.execution.python_interpreter.clone_from(&state.python_interpreter);

    policy.python.allow_file_operations = state.allow_file_operations;
    if state.allow_file_operations {
        policy.python.dangerous_functions.remove("open");
    }

    policy.shell.allow_pipes = state.allow_pipes;
    policy.shell.allow_redirection = state.allow_redirection;
    policy.shell.allow_background = state.allow_background;
    policy
        .shell
        .allowed_commands
        .extend(state.extra_commands.iter().cloned());

    policy
}

fn step_review_and_write(state: &WizardState, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("== Step 4/4: Review & Write ==\n");

    let policy = build_policy(state);
    let toml_str = toml::to_string_pretty(&policy)?;

    let blocked: Vec<&String> = state
        .extra_commands
        .iter()
        .filter(|c| policy.shell.blocked_commands.contains(*c))
        .collect();
    if !blocked.is_empty() {
        println!("Note: still blocked despite being allowed: {blocked:?}\n");
    }

    println!("--- Generated policy ---");
    println!("{toml_str}");
    println!("------------------------\n");

    let default_path = PolicyStore::default_path();
    let path = output.unwrap_or_else(|| {
        Input::new()
            .with_prompt("Write policy to")
            .default(default_path.display().to_string())
            .interact_text()
            .map(PathBuf::from)
            .unwrap_or(default_path)
    });

    if path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &toml_str)?;
    println!("Policy written to {}", path.display());

    Ok(())
}
