use std::path::{Path, PathBuf};
use std::sync::Arc;

use toml::{Table, Value};

use crate::error::PolicyError;
use crate::merge::merge_tables;
use crate::types::SecurityPolicy;

/// Where the effective policy came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Defaults,
    File(PathBuf),
}

/// Loaded policy: the typed value handed to validators plus the merged
/// document, which keeps keys the typed value does not know about.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    policy: Arc<SecurityPolicy>,
    document: Table,
    source: PolicySource,
}

impl PolicyStore {
    /// `~/.adorable/security.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        crate::adorable_home().join("security.toml")
    }

    /// Store built from the hardcoded defaults only.
    #[must_use]
    pub fn defaults() -> Self {
        let policy = SecurityPolicy::default();
        let document = default_document(&policy).unwrap_or_default();
        Self {
            policy: Arc::new(policy),
            document,
            source: PolicySource::Defaults,
        }
    }

    /// Load defaults and merge the user file at `path` over them.
    ///
    /// Never fails: a missing, unreadable or malformed override is skipped
    /// with a warning and the defaults stay in effect.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let mut store = if path.exists() {
            match Self::from_file(&path) {
                Ok(store) => store,
                Err(e) => {
                    tracing::warn!("ignoring user security policy: {e}");
                    Self::defaults()
                }
            }
        } else {
            tracing::debug!("no security policy at {}, using defaults", path.display());
            Self::defaults()
        };
        store.apply_env_overrides();
        store
    }

    /// Strict variant of [`PolicyStore::load`] that reports why an override was rejected.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// deserialized into the policy schema.
    pub fn try_load(path: &Path) -> Result<Self, PolicyError> {
        let mut store = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::defaults()
        };
        store.apply_env_overrides();
        Ok(store)
    }

    fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: Table = toml::from_str(&content).map_err(|source| PolicyError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store = Self::from_overlay(overlay)?;
        store.source = PolicySource::File(path.to_path_buf());
        Ok(store)
    }

    /// Merge an already parsed override document over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged document does not fit the policy schema.
    pub fn from_overlay(overlay: Table) -> Result<Self, PolicyError> {
        let mut document = default_document(&SecurityPolicy::default())?;
        merge_tables(&mut document, overlay);
        let policy = Value::Table(document.clone()).try_into::<SecurityPolicy>()?;
        Ok(Self {
            policy: Arc::new(policy),
            document,
            source: PolicySource::Defaults,
        })
    }

    #[must_use]
    pub fn policy(&self) -> Arc<SecurityPolicy> {
        Arc::clone(&self.policy)
    }

    /// Merged document, including unrecognized keys from the user file.
    #[must_use]
    pub fn document(&self) -> &Table {
        &self.document
    }

    #[must_use]
    pub fn source(&self) -> &PolicySource {
        &self.source
    }

    pub(crate) fn policy_mut(&mut self) -> &mut SecurityPolicy {
        Arc::make_mut(&mut self.policy)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::defaults()
    }
}

fn default_document(policy: &SecurityPolicy) -> Result<Table, PolicyError> {
    match Value::try_from(policy)? {
        Value::Table(table) => Ok(table),
        _ => Ok(Table::new()),
    }
}
