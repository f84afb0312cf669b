//! Error types
//!
//! [`StageError`] is the classified error every store and use case returns.
//! [`RemoteError`] is what the remote collaborators report; it crosses into
//! the staging layer as [`StageError::RemoteOperationFailed`].

use crate::models::Service;

/// Result type for store and use-case operations
pub type StageResult<T> = std::result::Result<T, StageError>;

/// Errors reported by the remote resource API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("version {version} of '{name}' not found")]
    VersionNotFound { name: String, version: String },

    #[error("{0}")]
    Api(String),

    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{service} '{name}' is not staged")]
    NotStaged { service: Service, name: String },

    #[error("tag '{key}' is not staged for {service} '{name}'")]
    TagKeyNotStaged {
        service: Service,
        name: String,
        key: String,
    },

    #[error("invalid service: '{0}' (expected 'parameter' or 'secret')")]
    InvalidService(String),

    #[error("failed to decrypt staging file: wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("staging file is encrypted; a passphrase is required")]
    PassphraseRequired,

    #[error("conflict on '{name}': {reason}")]
    Conflict { name: String, reason: String },

    #[error("remote operation failed: {0}")]
    RemoteOperationFailed(#[from] RemoteError),

    #[error("resident store already has different staged changes for: {}", .names.join(", "))]
    DrainCollision { names: Vec<String> },

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{service} '{name}' not found remotely")]
    NotFound { service: Service, name: String },

    #[error("{service} '{name}' already exists remotely")]
    AlreadyExists { service: Service, name: String },

    #[error("invalid delete options: {0}")]
    InvalidDeleteOptions(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("staging state is corrupt: {0}")]
    CorruptState(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StageError {
    pub fn not_staged(service: Service, name: impl Into<String>) -> Self {
        StageError::NotStaged {
            service,
            name: name.into(),
        }
    }

    /// Stable tag for the error class, used at the front-end boundary
    pub fn code(&self) -> &'static str {
        match self {
            StageError::NotStaged { .. } | StageError::TagKeyNotStaged { .. } => "not_staged",
            StageError::InvalidService(_) => "invalid_service",
            StageError::DecryptionFailed => "decryption_failed",
            StageError::PassphraseRequired => "passphrase_required",
            StageError::Conflict { .. } => "conflict",
            StageError::RemoteOperationFailed(_) => "remote_operation_failed",
            StageError::DrainCollision { .. } => "drain_collision",
            StageError::InvalidScope(_) => "invalid_scope",
            StageError::InvalidName { .. } => "invalid_name",
            StageError::InvalidOperation(_) => "invalid_operation",
            StageError::NotFound { .. } => "not_found",
            StageError::AlreadyExists { .. } => "already_exists",
            StageError::InvalidDeleteOptions(_) => "invalid_delete_options",
            StageError::Cancelled => "cancelled",
            StageError::CorruptState(_) => "corrupt_state",
            StageError::Encryption(_) => "encryption_failed",
            StageError::Io(_) => "io_error",
            StageError::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_not_staged(&self) -> bool {
        matches!(
            self,
            StageError::NotStaged { .. } | StageError::TagKeyNotStaged { .. }
        )
    }
}
