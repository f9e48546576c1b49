use crate::store::PolicyStore;

impl PolicyStore {
    pub(crate) fn apply_env_overrides(&mut self) {
        let execution = &mut self.policy_mut().execution;

        if let Ok(v) = std::env::var("ADORABLE_AUDIT_MODE") {
            match v.parse::<bool>() {
                Ok(enabled) => execution.audit_mode = enabled,
                Err(_) => tracing::warn!("ignoring invalid ADORABLE_AUDIT_MODE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("ADORABLE_LOG_EXECUTIONS") {
            match v.parse::<bool>() {
                Ok(enabled) => execution.log_executions = enabled,
                Err(_) => tracing::warn!("ignoring invalid ADORABLE_LOG_EXECUTIONS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("ADORABLE_MAX_EXECUTION_TIME") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => execution.max_execution_time = secs,
                _ => tracing::warn!("ignoring invalid ADORABLE_MAX_EXECUTION_TIME value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("ADORABLE_MAX_MEMORY_MB") {
            match v.parse::<u64>() {
                Ok(mb) => execution.max_memory_mb = mb,
                Err(_) => tracing::warn!("ignoring invalid ADORABLE_MAX_MEMORY_MB value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("ADORABLE_PYTHON_INTERPRETER")
            && !v.trim().is_empty()
        {
            execution.python_interpreter = Some(v);
        }
    }
}
