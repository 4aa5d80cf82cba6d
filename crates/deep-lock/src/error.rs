//! Error contract for deep-lock entry points.
//!
//! Codes are append-only: an assigned `FE-DLOCK-*` code is never reused.

use thiserror::Error;

use crate::object_model::{ObjectError, ObjectHandle};

/// Errors surfaced by the action resolver and the graph locker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeepLockError {
    /// `options.action` named something other than the three lock actions.
    /// Raised before any node is touched.
    #[error("Options action can't be {action}")]
    InvalidAction { action: String },
    /// A lock primitive or own-property read failed mid-traversal.  Nodes
    /// visited before `handle` stay locked.
    #[error("unexpected lock failure at {handle}: {source}")]
    UnexpectedLockFailure {
        handle: ObjectHandle,
        source: ObjectError,
    },
    /// Options text could not be decoded.
    #[error("invalid deep lock options: {detail}")]
    InvalidOptions { detail: String },
}

impl DeepLockError {
    /// Stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAction { .. } => "FE-DLOCK-0001",
            Self::UnexpectedLockFailure { .. } => "FE-DLOCK-0002",
            Self::InvalidOptions { .. } => "FE-DLOCK-0003",
        }
    }

    /// Whether the graph may have been partially locked.
    pub fn is_partial_lock(&self) -> bool {
        matches!(self, Self::UnexpectedLockFailure { .. })
    }
}
