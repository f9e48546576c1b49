//! Static checks for a single shell command line.

use std::sync::LazyLock;

use adorable_policy::ShellPolicy;
use regex::Regex;

use crate::validation::{ValidationResult, Violation};

const HARD_BAN: &[&str] = &[
    r";\s*rm\s+",
    r"&&\s*rm\s+",
    r"\|\|\s*rm\s+",
    r"rm\s+-rf\s+/",
    r"chmod\s+777",
    r"sudo\s+",
];

const SUBSTITUTIONS: &[&str] = &["$(", "`", "<(", ">("];

static HARD_BAN_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    HARD_BAN
        .iter()
        .filter_map(|src| Regex::new(&format!("(?i){src}")).ok().map(|re| (*src, re)))
        .collect()
});

/// Validate `command` against `policy`.
///
/// Hard-ban patterns apply before the allow-list, so `rm -rf /` is refused
/// even when `rm` is allowed. `;`, newlines and command substitution are
/// always refused; every stage of a permitted pipeline or `&&`/`||`/`&` list
/// must pass the allow and block lists.
#[must_use]
pub fn validate(command: &str, policy: &ShellPolicy) -> ValidationResult {
    match check(command, policy) {
        Ok(()) => ValidationResult::passed("Command validation passed"),
        Err(violation) => ValidationResult::rejected(violation),
    }
}

/// Split a command line into words using POSIX shell quoting.
///
/// # Errors
///
/// Returns [`Violation::Parse`] on unbalanced quotes or a dangling escape.
pub fn tokenize(command: &str) -> Result<Vec<String>, Violation> {
    shell_words::split(command).map_err(|e| Violation::Parse(e.to_string()))
}

/// Operators in the raw string that need a shell to take effect.
#[must_use]
pub fn uses_shell_operators(command: &str) -> bool {
    command.contains(['|', '>', '<', '&'])
}

fn check(command: &str, policy: &ShellPolicy) -> Result<(), Violation> {
    let tokens = tokenize(command)?;
    let Some(main_cmd) = tokens.first() else {
        return Err(Violation::EmptyCommand);
    };

    if let Some(pattern) = find_hard_ban(command) {
        return Err(Violation::DangerousPattern(pattern));
    }

    if command.contains([';', '\n']) {
        return Err(Violation::Chaining);
    }
    if SUBSTITUTIONS.iter().any(|s| command.contains(s)) {
        return Err(Violation::Substitution);
    }

    check_program(main_cmd, policy)?;

    if !policy.allow_pipes && command.contains('|') {
        return Err(Violation::Pipe);
    }
    if !policy.allow_redirection && command.contains(['>', '<']) {
        return Err(Violation::Redirection);
    }
    if !policy.allow_background && command.contains('&') {
        return Err(Violation::Background);
    }

    // Permitted operators run under `sh`, so every stage is a program of its own.
    for segment in segments(command) {
        let words = tokenize(segment)?;
        if let Some(program) = words.first() {
            check_program(program, policy)?;
        }
    }

    Ok(())
}

fn check_program(program: &str, policy: &ShellPolicy) -> Result<(), Violation> {
    if !policy.allowed_commands.contains(program) {
        return Err(Violation::NotAllowed(program.to_owned()));
    }
    if !policy.is_command_allowed(program) {
        return Err(Violation::Blocked(program.to_owned()));
    }
    Ok(())
}

/// Split on `|`, `||`, `&` and `&&` outside quotes. `>&`, `<&` and `&>`
/// belong to a redirection and do not split.
fn segments(command: &str) -> Vec<&str> {
    let bytes = command.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(b'"') if b == b'\\' => i += 1,
            Some(_) => {}
            None => match b {
                b'\\' => i += 1,
                b'\'' | b'"' => quote = Some(b),
                b'|' | b'&' => {
                    let redirect = b == b'&'
                        && ((i > 0 && matches!(bytes[i - 1], b'>' | b'<'))
                            || bytes.get(i + 1) == Some(&b'>'));
                    if !redirect {
                        out.push(&command[start..i]);
                        while bytes.get(i + 1) == Some(&b) {
                            i += 1;
                        }
                        start = i + 1;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    out.push(&command[start..]);
    out
}

fn find_hard_ban(command: &str) -> Option<&'static str> {
    HARD_BAN_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(command))
        .map(|(src, _)| *src)
}
