//! Error types for mvkv core.

use crate::types::{Key, Tid};
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Why a commit failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A key read at the snapshot was overwritten before the commit tid.
    StaleRead {
        /// The key whose read went stale.
        key: Key,
    },
    /// A key appeared inside a range this transaction observed as empty.
    Phantom {
        /// The key that appeared.
        key: Key,
    },
    /// A record needed for validation stayed locked by another committer.
    LockContention {
        /// The contended key.
        key: Key,
    },
}

impl AbortReason {
    /// Returns the key that triggered the abort.
    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            Self::StaleRead { key } | Self::Phantom { key } | Self::LockContention { key } => key,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleRead { key } => write!(f, "stale read of {key}"),
            Self::Phantom { key } => write!(f, "phantom insert of {key}"),
            Self::LockContention { key } => write!(f, "lock contention on {key}"),
        }
    }
}

/// Errors that can occur in mvkv core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Commit-time validation failed. Retry the whole transaction.
    #[error("transaction aborted at {commit_tid} (snapshot {snapshot_tid}): {reason}")]
    AbortConflict {
        /// What failed validation.
        reason: AbortReason,
        /// Snapshot the transaction read at.
        snapshot_tid: Tid,
        /// Commit tid that was allocated for the failed attempt, or the
        /// snapshot tid for a read-only transaction.
        commit_tid: Tid,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The process-wide clock was initialized twice.
    #[error("global clock already initialized at {current}")]
    ClockAlreadyInitialized {
        /// Current value of the existing clock.
        current: Tid,
    },
}

impl CoreError {
    /// Creates an abort conflict error.
    pub fn abort_conflict(reason: AbortReason, snapshot_tid: Tid, commit_tid: Tid) -> Self {
        Self::AbortConflict {
            reason,
            snapshot_tid,
            commit_tid,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying the transaction with a fresh snapshot may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AbortConflict { .. })
    }

    /// Returns the abort reason for conflict errors.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Self::AbortConflict { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
