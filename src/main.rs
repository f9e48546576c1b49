use std::collections::HashMap;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use adorable_policy::{PolicySource, PolicyStore, SecurityPolicy};
use adorable_tools::{
    AuditLogger, CompositeExecutor, ExtensionExecutor, ExtensionRegistry, SecurePythonTool,
    SecureShellTool, ToolCall, ToolError, ToolExecutor, ToolOutput, ToolRegistry,
    ValidationResult,
};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;

mod init;

type Executor =
    CompositeExecutor<SecurePythonTool, CompositeExecutor<SecureShellTool, ExtensionExecutor>>;

#[derive(Debug, Parser)]
#[command(
    name = "adorable",
    version,
    about = "Policy-gated python and shell execution for LLM agents"
)]
struct Cli {
    /// Security policy file (defaults to $ADORABLE_SECURITY_CONFIG, then ~/.adorable/security.toml)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    /// Emit audit records through the log instead of the per-kind files
    #[arg(long, global = true)]
    audit_stdout: bool,

    /// Working directory for executed code
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Directory of extension tool manifests (defaults to ~/.adorable/tools)
    #[arg(long, global = true)]
    ext_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate and run python code (`-` reads from stdin)
    Python {
        code: String,
        /// Variable whose final value is printed after the output
        #[arg(long)]
        return_var: Option<String>,
    },
    /// Validate and run a shell command
    Shell {
        command: String,
        /// Number of trailing output lines to print
        #[arg(long, default_value_t = adorable_tools::shell::DEFAULT_TAIL)]
        tail: usize,
    },
    /// Validate without executing (`-` reads from stdin)
    Check {
        #[arg(value_enum)]
        kind: CheckKind,
        input: String,
    },
    /// Run every ```python block, then every ```bash block, of an LLM response file (`-` for stdin)
    Respond { file: PathBuf },
    /// Invoke a tool by id with JSON parameters
    Call {
        tool_id: String,
        /// JSON object of parameters
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Print the effective policy
    Policy {
        /// Fail on an unreadable or invalid policy file instead of using defaults
        #[arg(long)]
        strict: bool,
        /// Print the merged document, including keys the sandbox does not use
        #[arg(long)]
        raw: bool,
    },
    /// List available tools in prompt format
    Tools,
    /// Interactively create a policy file
    Init {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CheckKind {
    Python,
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_subscriber();
    let cli = Cli::parse();

    if let Command::Init { ref output } = cli.command {
        init::run(output.clone())?;
        return Ok(ExitCode::SUCCESS);
    }

    let policy_path = resolve_policy_path(cli.policy.as_deref());
    let store = if matches!(cli.command, Command::Policy { strict: true, .. }) {
        PolicyStore::try_load(&policy_path)
            .with_context(|| format!("invalid security policy {}", policy_path.display()))?
    } else {
        PolicyStore::load(Some(policy_path.as_path()))
    };
    let policy = store.policy();

    let workdir = match cli.workdir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    let mut python = SecurePythonTool::from_policy(Arc::clone(&policy)).with_base_dir(&workdir);
    let mut shell = SecureShellTool::from_policy(Arc::clone(&policy)).with_base_dir(&workdir);
    let mut ext_shell = SecureShellTool::from_policy(Arc::clone(&policy)).with_base_dir(&workdir);
    if cli.audit_stdout {
        python = python.with_audit(AuditLogger::stdout());
        shell = shell.with_audit(AuditLogger::stdout());
        ext_shell = ext_shell.with_audit(AuditLogger::stdout());
    }
    let ext_dir = cli
        .ext_dir
        .clone()
        .unwrap_or_else(|| adorable_policy::adorable_home().join("tools"));

    match cli.command {
        Command::Python { code, return_var } => {
            let code = read_input(&code)?;
            if requires_confirmation(&policy, adorable_tools::secure_python::TOOL_ID) {
                confirm(adorable_tools::secure_python::TOOL_ID, &code, cli.yes)?;
            }
            let out = python
                .execute_python_code(&code, return_var.as_deref())
                .await;
            Ok(print_outcome(&out))
        }
        Command::Shell { command, tail } => {
            if requires_confirmation(&policy, adorable_tools::secure_shell::TOOL_ID) {
                confirm(adorable_tools::secure_shell::TOOL_ID, &command, cli.yes)?;
            }
            let out = shell.run_shell_command(&command, Some(tail)).await;
            Ok(print_outcome(&out))
        }
        Command::Check { kind, input } => {
            let input = read_input(&input)?;
            let verdict = match kind {
                CheckKind::Python => adorable_tools::python::validate(&input, &policy.python),
                CheckKind::Shell => adorable_tools::shell::validate(&input, &policy.shell),
            };
            Ok(print_verdict(&verdict))
        }
        Command::Respond { file } => {
            let response = if file.as_os_str() == "-" {
                read_input("-")?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?
            };
            if !response.contains("```") {
                eprintln!("no fenced blocks found");
                return Ok(ExitCode::SUCCESS);
            }
            if requires_confirmation(&policy, adorable_tools::secure_shell::TOOL_ID) {
                confirm(adorable_tools::secure_shell::TOOL_ID, &response, cli.yes)?;
            }
            let outputs = run_response_blocks(&python, &shell, &response).await?;
            if outputs.is_empty() {
                eprintln!("no ```python or ```bash blocks found");
            }
            for output in &outputs {
                println!("{output}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Call { tool_id, params } => {
            let params: HashMap<String, serde_json::Value> =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            let executor = build_executor(python, shell, ext_shell, &ext_dir);
            let needs_confirmation = !policy.execution.audit_mode
                && executor
                    .tool_definitions()
                    .iter()
                    .any(|d| d.id == tool_id && d.requires_confirmation);
            if needs_confirmation {
                let payload = serde_json::to_string_pretty(&params)?;
                confirm(&tool_id, &payload, cli.yes)?;
            }
            let call = ToolCall { tool_id, params };
            let Some(output) = executor.execute_tool_call(&call).await? else {
                bail!("unknown tool: {}", call.tool_id);
            };
            Ok(print_outcome(&output.summary))
        }
        Command::Policy { raw, .. } => {
            match store.source() {
                PolicySource::File(path) => println!("# source: {}", path.display()),
                PolicySource::Defaults => println!("# source: built-in defaults"),
            }
            let rendered = if raw {
                toml::to_string_pretty(store.document())?
            } else {
                toml::to_string_pretty(&*policy)?
            };
            print!("{rendered}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Tools => {
            let executor = build_executor(python, shell, ext_shell, &ext_dir);
            let registry = ToolRegistry::from_definitions(executor.tool_definitions());
            println!("{}", registry.format_for_prompt());
            Ok(ExitCode::SUCCESS)
        }
        Command::Init { .. } => unreachable!("handled before the policy is loaded"),
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    #[cfg(feature = "otel")]
    {
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            match setup_otel_tracer(&endpoint) {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt_layer)
                        .with(otel_layer)
                        .init();
                    return;
                }
                Err(e) => {
                    eprintln!("OTel initialization failed, falling back to fmt: {e}");
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(feature = "otel")]
fn setup_otel_tracer(endpoint: &str) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracer> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer("adorable");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracer)
}

fn resolve_policy_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    match std::env::var("ADORABLE_SECURITY_CONFIG") {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PolicyStore::default_path(),
    }
}

fn build_executor(
    python: SecurePythonTool,
    shell: SecureShellTool,
    ext_shell: SecureShellTool,
    ext_dir: &Path,
) -> Executor {
    let registry = ExtensionRegistry::load(ext_dir);
    tracing::debug!(count = registry.all().len(), "extension tools loaded");
    CompositeExecutor::new(
        python,
        CompositeExecutor::new(shell, ExtensionExecutor::new(registry, ext_shell)),
    )
}

/// `-` reads all of stdin; anything else is returned as given.
fn read_input(arg: &str) -> anyhow::Result<String> {
    if arg != "-" {
        return Ok(arg.to_owned());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

/// Python blocks run before bash blocks; each tool reports its own output.
async fn run_response_blocks(
    python: &SecurePythonTool,
    shell: &SecureShellTool,
    response: &str,
) -> Result<Vec<ToolOutput>, ToolError> {
    let mut outputs = Vec::new();
    if let Some(output) = python.execute(response).await? {
        outputs.push(output);
    }
    if let Some(output) = shell.execute(response).await? {
        outputs.push(output);
    }
    Ok(outputs)
}

fn requires_confirmation(policy: &SecurityPolicy, tool_id: &str) -> bool {
    !policy.execution.audit_mode && policy.execution.confirm_mode.requires_confirmation(tool_id)
}

fn confirm(tool_id: &str, payload: &str, yes: bool) -> anyhow::Result<()> {
    if yes {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        bail!("{tool_id} requires confirmation; rerun with --yes");
    }
    let approved = Confirm::new()
        .with_prompt(format!("Run {tool_id}?\n{payload}\n"))
        .default(false)
        .interact()?;
    if !approved {
        bail!("cancelled");
    }
    Ok(())
}

fn print_outcome(out: &str) -> ExitCode {
    println!("{out}");
    if out.starts_with("Error:") {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_verdict(verdict: &ValidationResult) -> ExitCode {
    if verdict.is_safe {
        println!("safe: {verdict}");
        ExitCode::SUCCESS
    } else {
        println!("unsafe: {verdict}");
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_shell_with_tail() {
        let cli = Cli::try_parse_from(["adorable", "shell", "ls -la", "--tail", "5"]).unwrap();
        assert!(
            matches!(cli.command, Command::Shell { ref command, tail: 5 } if command == "ls -la")
        );
    }

    #[test]
    fn shell_tail_defaults_to_100() {
        let cli = Cli::try_parse_from(["adorable", "shell", "pwd"]).unwrap();
        assert!(matches!(cli.command, Command::Shell { tail: 100, .. }));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "adorable", "python", "print(1)", "--yes", "--policy", "p.toml",
        ])
        .unwrap();
        assert!(cli.yes);
        assert_eq!(cli.policy, Some(PathBuf::from("p.toml")));
    }

    #[test]
    fn check_kind_parses() {
        let cli = Cli::try_parse_from(["adorable", "check", "shell", "ls"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Check {
                kind: CheckKind::Shell,
                ..
            }
        ));
    }

    #[test]
    fn policy_flag_wins() {
        assert_eq!(
            resolve_policy_path(Some(Path::new("/etc/adorable.toml"))),
            PathBuf::from("/etc/adorable.toml")
        );
    }

    #[test]
    fn literal_input_passes_through() {
        assert_eq!(read_input("print(1)").unwrap(), "print(1)");
    }

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(print_outcome("10"), ExitCode::SUCCESS);
        assert_eq!(print_outcome("Error: nope"), ExitCode::FAILURE);
    }

    #[test]
    fn confirmation_only_for_code_execution() {
        let policy = SecurityPolicy::default();
        assert!(!requires_confirmation(&policy, "word_count"));
        assert!(requires_confirmation(&policy, "run_shell_command"));
        assert!(confirm("run_shell_command", "ls", true).is_ok());
    }

    #[test]
    fn confirmation_skipped_in_audit_mode() {
        let mut policy = SecurityPolicy::default();
        policy.execution.audit_mode = true;
        assert!(!requires_confirmation(&policy, "execute_python_code"));
    }

    #[tokio::test]
    async fn response_runs_bash_blocks_alongside_python() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = SecurityPolicy::default();
        policy.execution.audit_dir = Some(dir.path().to_path_buf());
        let policy = Arc::new(policy);
        let python = SecurePythonTool::from_policy(Arc::clone(&policy)).without_audit();
        let shell = SecureShellTool::from_policy(policy).without_audit();

        let response = "```python\neval('1')\n```\nthen\n```bash\necho from-bash\n```";
        let outputs = run_response_blocks(&python, &shell, response).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].tool_name, "execute_python_code");
        assert!(outputs[0].summary.contains("Dangerous function 'eval'"));
        assert_eq!(outputs[1].tool_name, "run_shell_command");
        assert_eq!(outputs[1].summary, "$ echo from-bash\nfrom-bash");
    }

    #[test]
    fn tools_listing_includes_both_runners() {
        let policy = Arc::new(SecurityPolicy::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = build_executor(
            SecurePythonTool::from_policy(Arc::clone(&policy)).without_audit(),
            SecureShellTool::from_policy(Arc::clone(&policy)).without_audit(),
            SecureShellTool::from_policy(policy).without_audit(),
            dir.path(),
        );
        let prompt = ToolRegistry::from_definitions(executor.tool_definitions()).format_for_prompt();
        assert!(prompt.contains("execute_python_code"));
        assert!(prompt.contains("run_shell_command"));
    }
}
