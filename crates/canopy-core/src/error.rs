//! Error types for the Canopy permission engine.

use std::path::Path;

/// Errors that can occur while resolving or mutating permissions.
///
/// The variants follow the engine's failure taxonomy: callers match on
/// [`Error::InheritsFrom`] to redirect to the governing ACL, on
/// [`Error::Conflict`] for illegal state transitions, and treat
/// [`Error::InvariantViolation`] as a bug that must never be papered over.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A referenced node or ACL does not exist at all.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of thing was looked up ("node", "acl", ...)
        kind: &'static str,
        /// Identifier that was not found
        id: String,
    },

    /// The resource does not own an ACL; its permissions live elsewhere.
    #[error("resource {resource} inherits its permissions from {benefactor}")]
    InheritsFrom {
        /// Resource that was asked for
        resource: String,
        /// Resource whose ACL actually governs it
        benefactor: String,
    },

    /// The requested transition is illegal in the current state.
    #[error("Conflicting state: {message}")]
    Conflict {
        /// What conflicted
        message: String,
    },

    /// An ACL was modified by someone else since it was read.
    #[error("ACL for {resource} was modified concurrently (expected etag {expected})")]
    ConcurrentUpdate {
        /// Resource owning the ACL
        resource: String,
        /// Etag the caller presented
        expected: String,
    },

    /// The caller lacks the access required for the operation.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Why access was refused
        message: String,
    },

    /// Roots and projects always own their ACL.
    #[error("cannot remove the ACL of root or project resource {resource}")]
    CannotRemoveProjectAcl {
        /// The root or project resource
        resource: String,
    },

    /// ACL content failed validation.
    #[error("Invalid ACL: {message}")]
    InvalidAcl {
        /// What is wrong with the ACL
        message: String,
    },

    /// Benefactor bookkeeping is inconsistent. Always a bug.
    #[error("Invariant violation: {message}")]
    InvariantViolation {
        /// Description of the broken invariant
        message: String,
    },

    /// An operation would touch more nodes than the configured ceiling.
    #[error("{operation} exceeded the limit of {limit} nodes")]
    LimitExceeded {
        /// Operation that was cut short
        operation: &'static str,
        /// Configured ceiling
        limit: usize,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// Backing store failure
    #[error("Storage error: {message}")]
    Storage {
        /// What the backend reported
        message: String,
    },

    /// I/O error with the path involved
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience `Result` type alias for Canopy operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether retrying the same call may succeed.
    ///
    /// Concurrent ACL edits and backend hiccups are transient; every other
    /// failure will repeat until the input or the data changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConcurrentUpdate { .. } => true,
            Error::Storage { .. } => true,
            Error::Io { .. } => true,
            Error::NotFound { .. }
            | Error::InheritsFrom { .. }
            | Error::Conflict { .. }
            | Error::Unauthorized { .. }
            | Error::CannotRemoveProjectAcl { .. }
            | Error::InvalidAcl { .. }
            | Error::InvariantViolation { .. }
            | Error::LimitExceeded { .. }
            | Error::Config { .. }
            | Error::Serialization(_) => false,
        }
    }

    /// Whether this error is the caller's fault (vs. a server-side fault).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::InheritsFrom { .. }
                | Error::Conflict { .. }
                | Error::ConcurrentUpdate { .. }
                | Error::Unauthorized { .. }
                | Error::CannotRemoveProjectAcl { .. }
                | Error::InvalidAcl { .. }
                | Error::LimitExceeded { .. }
        )
    }

    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates the redirect error for a resource that inherits.
    pub fn inherits_from(resource: impl ToString, benefactor: impl ToString) -> Self {
        Error::InheritsFrom {
            resource: resource.to_string(),
            benefactor: benefactor.to_string(),
        }
    }

    /// Creates a conflicting-state error.
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Error::Conflict {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Error::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates an ACL validation error.
    pub fn invalid_acl<S: Into<String>>(message: S) -> Self {
        Error::InvalidAcl {
            message: message.into(),
        }
    }

    /// Creates an invariant violation.
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Error::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the path that caused it.
    pub fn io_with_path(source: std::io::Error, path: &Path) -> Self {
        Error::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
