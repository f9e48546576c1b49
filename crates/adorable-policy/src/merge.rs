use toml::{Table, Value};

/// Recursively merge `overlay` into `base`.
///
/// Tables merge key-by-key and unknown keys are added. A leaf whose TOML type
/// differs from the existing value is rejected and the existing value kept;
/// an integer may replace a float.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    merge_at(base, overlay, "");
}

fn merge_at(base: &mut Table, overlay: Table, path: &str) {
    for (key, value) in overlay {
        let key_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };

        let Some(existing) = base.get_mut(&key) else {
            base.insert(key, value);
            continue;
        };

        match (existing, value) {
            (Value::Table(existing), Value::Table(incoming)) => {
                merge_at(existing, incoming, &key_path);
            }
            (existing, incoming) if compatible(existing, &incoming) => {
                *existing = widen(existing, incoming);
            }
            (existing, incoming) => {
                tracing::warn!(
                    "ignoring policy override for {key_path}: expected {}, got {}",
                    existing.type_str(),
                    incoming.type_str()
                );
            }
        }
    }
}

fn compatible(existing: &Value, incoming: &Value) -> bool {
    match (existing, incoming) {
        (Value::Float(_), Value::Integer(_)) => true,
        (Value::Array(current), Value::Array(next)) => match (current.first(), next.first()) {
            (Some(a), Some(b)) => a.same_type(b) && next.iter().all(|v| v.same_type(b)),
            _ => true,
        },
        (a, b) => a.same_type(b),
    }
}

#[allow(clippy::cast_precision_loss)]
fn widen(existing: &Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Float(_), Value::Integer(i)) => Value::Float(i as f64),
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Table {
        src.parse().unwrap()
    }

    #[test]
    fn leaf_override_wins() {
        let mut base = table("[shell]\nallow_pipes = false\ntimeout = 30");
        merge_tables(&mut base, table("[shell]\nallow_pipes = true"));
        assert_eq!(base["shell"]["allow_pipes"].as_bool(), Some(true));
        assert_eq!(base["shell"]["timeout"].as_integer(), Some(30));
    }

    #[test]
    fn unknown_keys_are_added() {
        let mut base = table("[shell]\nallow_pipes = false");
        merge_tables(
            &mut base,
            table("notes = \"local\"\n[shell]\nmotd = \"hi\"\n[extra]\nx = 1"),
        );
        assert_eq!(base["notes"].as_str(), Some("local"));
        assert_eq!(base["shell"]["motd"].as_str(), Some("hi"));
        assert_eq!(base["extra"]["x"].as_integer(), Some(1));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let mut base = table("[shell]\nallowed_commands = [\"ls\", \"cat\"]");
        merge_tables(&mut base, table("[shell]\nallowed_commands = [\"git\"]"));
        let cmds = base["shell"]["allowed_commands"].as_array().unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].as_str(), Some("git"));
    }

    #[test]
    fn type_mismatch_keeps_default() {
        let mut base = table("[execution]\naudit_mode = false\nmax_execution_time = 30");
        merge_tables(
            &mut base,
            table("[execution]\naudit_mode = \"yes\"\nmax_execution_time = 60"),
        );
        assert_eq!(base["execution"]["audit_mode"].as_bool(), Some(false));
        assert_eq!(base["execution"]["max_execution_time"].as_integer(), Some(60));
    }

    #[test]
    fn array_element_mismatch_keeps_default() {
        let mut base = table("[shell]\nallowed_commands = [\"ls\"]");
        merge_tables(&mut base, table("[shell]\nallowed_commands = [1, 2]"));
        let cmds = base["shell"]["allowed_commands"].as_array().unwrap();
        assert_eq!(cmds[0].as_str(), Some("ls"));
    }

    #[test]
    fn scalar_cannot_replace_table() {
        let mut base = table("[shell]\nallow_pipes = false");
        merge_tables(&mut base, table("shell = true"));
        assert!(base["shell"].is_table());
    }

    #[test]
    fn empty_array_overrides() {
        let mut base = table("[python]\nsafe_modules = [\"json\"]");
        merge_tables(&mut base, table("[python]\nsafe_modules = []"));
        assert!(base["python"]["safe_modules"].as_array().unwrap().is_empty());
    }

    #[test]
    fn integer_widens_to_float() {
        let mut base = table("ratio = 0.5");
        merge_tables(&mut base, table("ratio = 1"));
        assert_eq!(base["ratio"].as_float(), Some(1.0));
    }
}
