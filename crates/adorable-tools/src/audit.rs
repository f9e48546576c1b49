use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;

use crate::context::ExecutionContext;

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Python,
    Shell,
}

impl AuditKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Shell => "shell",
        }
    }

    #[must_use]
    pub fn log_file_name(self) -> &'static str {
        match self {
            Self::Python => "python_execution.log",
            Self::Shell => "shell_execution.log",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub execution_id: String,
    pub kind: AuditKind,
    pub payload: String,
    pub success: bool,
    pub output_length: usize,
    pub error_length: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<String>,
}

impl AuditRecord {
    /// Record for a finished execution. `output_length` is always the output's
    /// size; output starting with `Error:` also counts as a failure and sets
    /// `error_length`.
    #[must_use]
    pub fn executed(kind: AuditKind, payload: &str, output: &str, ctx: &ExecutionContext) -> Self {
        let success = !output.starts_with("Error:");
        let len = output.chars().count();
        Self {
            timestamp: timestamp(ctx),
            execution_id: ctx.execution_id.clone(),
            kind,
            payload: excerpt(payload),
            success,
            output_length: len,
            error_length: if success { 0 } else { len },
            duration_ms: ctx.duration_ms(),
            blocked: None,
        }
    }

    /// Record for a call the validator refused.
    #[must_use]
    pub fn blocked(kind: AuditKind, payload: &str, reason: &str, ctx: &ExecutionContext) -> Self {
        Self {
            timestamp: timestamp(ctx),
            execution_id: ctx.execution_id.clone(),
            kind,
            payload: excerpt(payload),
            success: false,
            output_length: 0,
            error_length: reason.chars().count(),
            duration_ms: ctx.duration_ms(),
            blocked: Some(reason.to_owned()),
        }
    }
}

fn timestamp(ctx: &ExecutionContext) -> String {
    ctx.end_time
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// First 200 characters of `payload`, with `...` appended when cut.
#[must_use]
pub fn excerpt(payload: &str) -> String {
    match payload.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &payload[..idx]),
        None => payload.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuditDestination {
    Stdout,
    File(PathBuf),
}

/// Best-effort append-only audit sink.
///
/// File destinations are opened in append mode for each record and closed
/// right after, so concurrent tools never share a handle. Write failures are
/// logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogger {
    destination: AuditDestination,
}

impl AuditLogger {
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            destination: AuditDestination::Stdout,
        }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            destination: AuditDestination::File(path.into()),
        }
    }

    /// Per-kind log file inside `dir`.
    #[must_use]
    pub fn for_kind(dir: &Path, kind: AuditKind) -> Self {
        Self::file(dir.join(kind.log_file_name()))
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.destination {
            AuditDestination::Stdout => None,
            AuditDestination::File(p) => Some(p),
        }
    }

    pub async fn log(&self, record: &AuditRecord) {
        let json = match serde_json::to_string(record) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("failed to serialize audit record: {e}");
                return;
            }
        };

        match &self.destination {
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(path) => {
                if let Err(e) = append_line(path, &json).await {
                    tracing::warn!("failed to write audit log {}: {e}", path.display());
                }
            }
        }
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(PathBuf::from("."));
        ctx.finish();
        ctx
    }

    fn read_records(path: &Path) -> Vec<AuditRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn excerpt_truncates_long_payloads() {
        let long = "x".repeat(250);
        let cut = excerpt(&long);
        assert_eq!(cut.len(), 203);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt("print(1)"), "print(1)");
        assert_eq!(excerpt(&"y".repeat(200)), "y".repeat(200));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let s = "é".repeat(300);
        let cut = excerpt(&s);
        assert_eq!(cut.chars().count(), 203);
    }

    #[test]
    fn success_derived_from_output_prefix() {
        let ok = AuditRecord::executed(AuditKind::Shell, "ls", "a\nb", &ctx());
        assert!(ok.success);
        assert_eq!(ok.output_length, 3);
        assert_eq!(ok.error_length, 0);

        let failed = AuditRecord::executed(AuditKind::Shell, "ls x", "Error: nope", &ctx());
        assert!(!failed.success);
        assert_eq!(failed.output_length, 11);
        assert_eq!(failed.error_length, 11);
    }

    #[test]
    fn blocked_record_serialization() {
        let record = AuditRecord::blocked(AuditKind::Python, "eval('1')", "Dangerous", &ctx());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"python\""));
        assert!(json.contains("\"blocked\":\"Dangerous\""));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn executed_record_omits_blocked() {
        let record = AuditRecord::executed(AuditKind::Python, "1", "1", &ctx());
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("blocked"));
        assert!(json.contains("\"execution_id\""));
    }

    #[test]
    fn per_kind_file_names() {
        let dir = Path::new("/var/log/adorable");
        assert_eq!(
            AuditLogger::for_kind(dir, AuditKind::Python).path(),
            Some(Path::new("/var/log/adorable/python_execution.log"))
        );
        assert_eq!(
            AuditLogger::for_kind(dir, AuditKind::Shell).path(),
            Some(Path::new("/var/log/adorable/shell_execution.log"))
        );
        assert_eq!(AuditLogger::stdout().path(), None);
    }

    #[tokio::test]
    async fn file_logger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::for_kind(&dir.path().join("nested"), AuditKind::Shell);
        for i in 0..3 {
            let record = AuditRecord::executed(AuditKind::Shell, &format!("cmd{i}"), "ok", &ctx());
            logger.log(&record).await;
        }
        let records = read_records(logger.path().unwrap());
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].payload, "cmd2");
        assert!(records.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let logger = AuditLogger::file(blocker.join("audit.log"));
        logger
            .log(&AuditRecord::executed(AuditKind::Python, "1", "1", &ctx()))
            .await;
    }

    #[tokio::test]
    async fn stdout_logger_does_not_panic() {
        AuditLogger::stdout()
            .log(&AuditRecord::executed(AuditKind::Shell, "ls", "x", &ctx()))
            .await;
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let record = AuditRecord::executed(AuditKind::Shell, "ls", "x", &ctx());
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }
}
