use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Bookkeeping for one `execute_python_code` / `run_shell_command` call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub working_dir: PathBuf,
    pub user_context: HashMap<String, serde_json::Value>,
    started: Instant,
    elapsed: Option<Duration>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(working_dir: PathBuf) -> Self {
        Self::with_user_context(working_dir, HashMap::new())
    }

    #[must_use]
    pub fn with_user_context(
        working_dir: PathBuf,
        user_context: HashMap<String, serde_json::Value>,
    ) -> Self {
        let mut execution_id = uuid::Uuid::new_v4().simple().to_string();
        execution_id.truncate(8);
        Self {
            execution_id,
            start_time: Utc::now(),
            end_time: None,
            working_dir,
            user_context,
            started: Instant::now(),
            elapsed: None,
        }
    }

    /// Mark the execution finished. Later calls keep the first end time.
    pub fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
            self.elapsed = Some(self.started.elapsed());
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Time spent so far, or the final duration once finished.
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn duration_ms(&self) -> u64 {
        self.execution_time().as_millis() as u64
    }
}
