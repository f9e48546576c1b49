use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("policy does not match the expected schema: {0}")]
    Schema(#[from] toml::de::Error),

    #[error("failed to serialize default policy: {0}")]
    Serialize(#[from] toml::ser::Error),
}
