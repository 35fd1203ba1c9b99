//! Error types for the Servflow engine

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Servflow engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Plan-compile-time configuration failure (unknown action type,
    /// missing referenced step, bad response code, constructor failure)
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong, naming the offending step or action ID
        message: String,
    },

    /// Template compilation or rendering failure
    #[error("Template error: {message}")]
    Template {
        /// What went wrong
        message: String,
    },

    /// An action's `execute` returned an error and no fail edge was
    /// configured. Distinguishable at the plan walker so the engine can
    /// still render an end-value template before surfacing the failure.
    #[error("Error executing action {id}: {message}")]
    ActionExecution {
        /// ID of the failing action step
        id: String,
        /// Failure detail from the executable
        message: String,
    },

    /// Non-fatal request validation failure
    #[error("Validation error: {message}")]
    Validation {
        /// What went wrong
        message: String,
    },

    /// Storage layer failure
    #[error("Storage error: {message}")]
    Storage {
        /// What went wrong
        message: String,
    },

    /// Integration lookup or capability failure
    #[error("Integration error: {message}")]
    Integration {
        /// What went wrong
        message: String,
    },

    /// Hard failure that must abort retry and fail the request
    /// outright. Reserved for action-produced conditions where
    /// fail-edge recovery would be wrong; used sparingly.
    #[error("Fatal engine error: {message}")]
    Fatal {
        /// What went wrong
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("Generic error: {0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Generic(message)
    }
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an action execution error for the given step ID
    pub fn action_execution<S: Into<String>>(id: S, message: S) -> Self {
        Self::ActionExecution {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an integration error
    pub fn integration<S: Into<String>>(message: S) -> Self {
        Self::Integration {
            message: message.into(),
        }
    }

    /// Create a fatal engine error
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// True when this error is the action-execution sentinel
    pub fn is_action_execution(&self) -> bool {
        matches!(self, Self::ActionExecution { .. })
    }

    /// True when this error must bypass fail-edge recovery
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}
