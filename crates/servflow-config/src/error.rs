//! Error types for configuration loading and validation

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating declarative configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO failure reading a config file or folder
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse failure
    #[error("YAML error in {path}: {source}")]
    Yaml {
        /// File that failed to parse
        path: String,
        /// Underlying parse error
        #[source]
        source: serde_yaml::Error,
    },

    /// Schema validation failure
    #[error("Validation failed for {path}: {message}")]
    Validation {
        /// File that failed validation
        path: String,
        /// Collected schema violations
        message: String,
    },

    /// Watcher setup failure
    #[error("Watch error: {0}")]
    Watch(String),
}

impl ConfigError {
    /// Create a YAML error for the given path
    pub fn yaml(path: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.into(),
            source,
        }
    }

    /// Create a validation error for the given path
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}
