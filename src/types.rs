//! Metamorph - Type Definitions
//!
//! All shared types for the self-modification engine: proposal and backup
//! records, risk levels, the status state machine, and the collaborator
//! traits the orchestrator is constructed with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─── Risk ────────────────────────────────────────────────────────

/// Severity of a proposed change, derived from the set of touched paths.
/// Ordering matters: gating and judgment merging use `max`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

// ─── Proposal ────────────────────────────────────────────────────

/// Lifecycle state of a proposal. Every state except `Pending` is terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Applied,
    Rejected,
    Reverted,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Applied => "applied",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Reverted => "reverted",
        };
        write!(f, "{s}")
    }
}

/// One file change inside a proposal: a repository-relative path plus the
/// unified-diff fragment to apply to it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub patch: String,
}

/// A named, risk-classified, not-yet-committed set of file changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub description: String,
    pub rationale: String,
    pub changes: Vec<FileChange>,
    pub risk_level: RiskLevel,
    pub status: ProposalStatus,
    /// Random single-use credential required to authorize application
    /// unless an auto-approval policy applies.
    pub approval_token: String,
    /// Reason recorded when the gate denies or the verifier reverts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// Apply attempt id of the backup taken when this proposal was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
}

// ─── Backup ──────────────────────────────────────────────────────

/// Pre-mutation content of one file. `content: None` marks a file that did
/// not exist before the apply, so rollback deletes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub path: String,
    pub content: Option<String>,
}

/// The exact snapshot of every file touched by one apply attempt, taken
/// before any write. Immutable once persisted; retained indefinitely.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    pub proposal_id: String,
    pub entries: Vec<BackupEntry>,
    pub created_at: String,
}

// ─── Operation outcomes ──────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeOutcome {
    pub id: String,
    pub approval_token: String,
    pub risk_level: RiskLevel,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub status: ProposalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl ApplyOutcome {
    /// Collapse the outcome for callers that only care whether the change
    /// is live: a reverted apply becomes
    /// [`VerificationFailed`](crate::error::EngineError::VerificationFailed)
    /// carrying the verifier's diagnostics.
    pub fn into_result(self) -> crate::error::Result<Self> {
        if self.status == ProposalStatus::Reverted {
            return Err(crate::error::EngineError::VerificationFailed {
                diagnostics: self.diagnostics.unwrap_or_default(),
            });
        }
        Ok(self)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub status: ProposalStatus,
    pub restored_files: u32,
}

// ─── Approval ────────────────────────────────────────────────────

/// The gate's answer for one proposal. A timed-out denial is fail-closed
/// like any other, but leaves the proposal pending and retryable instead
/// of transitioning it to rejected.
#[derive(Clone, Debug)]
pub struct Decision {
    pub approved: bool,
    pub reason: String,
    pub timed_out: bool,
}

impl Decision {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            timed_out: true,
        }
    }
}

/// Capability that decides whether a proposal may proceed to application.
/// The orchestrator never branches on which kind of gate it holds; it only
/// calls `decide`.
#[async_trait]
pub trait ApprovalDecider: Send + Sync {
    async fn decide(&self, proposal: &Proposal, token: Option<&str>) -> Decision;
}

// ─── Verifier ────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct VerifyReport {
    pub ok: bool,
    pub diagnostics: String,
}

/// External verification collaborator (syntax/type checker). Must be
/// callable repeatedly and must not mutate the files it inspects.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, changed_paths: &[String]) -> anyhow::Result<VerifyReport>;
}

// ─── Audit ───────────────────────────────────────────────────────

/// Fire-and-forget episodic ledger. A failure to record must never roll
/// back an already-committed apply.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(
        &self,
        apply_id: &str,
        description: &str,
        outcome: ProposalStatus,
        risk_level: RiskLevel,
    );
}

// ─── Risk judgment ───────────────────────────────────────────────

/// Optional external judgment (e.g. a supervisor model). Its answer can
/// only raise the mechanically computed risk level, never lower it.
#[async_trait]
pub trait RiskJudge: Send + Sync {
    async fn judge(&self, description: &str, paths: &[String]) -> Option<RiskLevel>;
}
