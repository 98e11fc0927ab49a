use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required input missing or invalid; raised before any side effect
    Configuration,
    /// Requested channel or operation not implemented by the adapter
    Unsupported,
    /// Runtime, session or persisted session id absent
    NotFound,
    /// The terminal backend failed
    External,
    /// The caller cancelled the operation
    Cancelled,
}

/// Errors returned by runtime adapters and the registry
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{runtime} runtime: {reason}")]
    Configuration { runtime: String, reason: String },

    #[error("{runtime} runtime does not support {operation}")]
    Unsupported { runtime: String, operation: String },

    #[error("runtime not registered: {0}")]
    NotRegistered(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("no persisted session id at {}", path.display())]
    SessionIdMissing { path: PathBuf },

    #[error("{op} failed for session {session}")]
    Backend {
        op: &'static str,
        session: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl RuntimeError {
    pub fn config(runtime: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            runtime: runtime.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(runtime: &str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            runtime: runtime.to_string(),
            operation: operation.into(),
        }
    }

    pub fn backend(op: &'static str, session: &str, source: anyhow::Error) -> Self {
        Self::Backend {
            op,
            session: session.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::NotRegistered(_) | Self::SessionNotFound(_) | Self::SessionIdMissing { .. } => {
                ErrorKind::NotFound
            }
            Self::Backend { .. } => ErrorKind::External,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised while reading or writing configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_not_found_variants() {
        assert_eq!(RuntimeError::NotRegistered("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(RuntimeError::SessionNotFound("s".into()).kind(), ErrorKind::NotFound);
        let missing = RuntimeError::SessionIdMissing {
            path: PathBuf::from("/w/.runtime/session_id"),
        };
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_backend_error_keeps_context() {
        let err = RuntimeError::backend("send-keys", "gt-a", anyhow::anyhow!("no server running"));
        assert_eq!(err.kind(), ErrorKind::External);
        assert_eq!(err.to_string(), "send-keys failed for session gt-a");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("no server running"));
    }
}
