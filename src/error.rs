//! Engine Error Taxonomy
//!
//! Every failure the engine can surface to a caller, as a typed enum so
//! callers can branch deterministically on the outcome of an apply attempt.

use thiserror::Error;

use crate::types::ProposalStatus;

/// All errors produced by the self-modification engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A proposed path escapes the configured source root (traversal,
    /// absolute path, or symlink resolution). Rejected before anything
    /// is persisted.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Unknown proposal or backup id.
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// The approval gate denied the proposal.
    #[error("approval denied: {reason}")]
    ApprovalDenied { reason: String },

    /// The interactive approval prompt expired without an answer.
    #[error("approval timed out")]
    ApprovalTimeout,

    /// The repository lock could not be acquired within the retry budget.
    /// The proposal is untouched and the call may be retried.
    #[error("timed out acquiring repository lock: {detail}")]
    LockTimeout { detail: String },

    /// A hunk's context lines no longer match the target file. The target
    /// has drifted since the patch was computed; retryable against fresh
    /// content.
    #[error("hunk mismatch in {path}: {detail}")]
    HunkMismatch { path: String, detail: String },

    /// The external verifier reported failure. The apply has been rolled
    /// back; not retryable against the same proposal.
    #[error("verification failed:\n{diagnostics}")]
    VerificationFailed { diagnostics: String },

    /// A status transition the state machine forbids.
    #[error("illegal status transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    /// A persisted record exists but cannot be read back. Surfaced loudly
    /// so an operator can inspect the underlying file; never silently
    /// repaired.
    #[error("corrupt store record {path}: {detail}")]
    StoreCorruption { path: String, detail: String },

    /// Combined patch text exceeds the configured size ceiling.
    #[error("patch size {size} exceeds maximum {max} bytes")]
    PatchTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller may retry the same operation without creating a
    /// new proposal. Retryable errors guarantee no file was left mutated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::LockTimeout { .. }
                | EngineError::ApprovalTimeout
                | EngineError::HunkMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
