//! Proposal Store
//!
//! One JSON record per proposal at `<state>/proposals/<id>.json`. Status
//! transitions enforce the lifecycle state machine and execute inside a
//! scoped repository-lock acquisition so concurrent processes cannot
//! interleave a read-check-write.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::error::{EngineError, Result};
use crate::types::{Proposal, ProposalStatus};

use super::lock::RepoLock;
use super::{read_record, write_record};

/// Subdirectory of the state dir holding proposal records.
const PROPOSALS_DIR: &str = "proposals";

pub struct ProposalStore {
    dir: PathBuf,
    lock: RepoLock,
}

/// Legal status transitions. `Pending` is the only non-terminal state;
/// a terminal state never transitions again.
fn transition_allowed(from: ProposalStatus, to: ProposalStatus) -> bool {
    matches!(
        (from, to),
        (ProposalStatus::Pending, ProposalStatus::Applied)
            | (ProposalStatus::Pending, ProposalStatus::Rejected)
            | (ProposalStatus::Pending, ProposalStatus::Reverted)
            | (ProposalStatus::Applied, ProposalStatus::Reverted)
    )
}

impl ProposalStore {
    pub fn new(state_dir: &std::path::Path, lock: RepoLock) -> Self {
        ProposalStore {
            dir: state_dir.join(PROPOSALS_DIR),
            lock,
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persist a new proposal atomically. The caller is responsible for
    /// having validated its paths first; nothing invalid reaches disk.
    pub fn create(&self, proposal: &Proposal) -> Result<()> {
        write_record(&self.record_path(&proposal.id), proposal)?;
        info!(id = %proposal.id, risk = %proposal.risk_level, "proposal persisted");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Proposal> {
        read_record(&self.record_path(id), id)
    }

    /// Transition a proposal's status, enforcing the state machine. The
    /// read-check-write runs under the repository lock; an illegal
    /// transition leaves the record untouched.
    pub fn set_status(
        &self,
        id: &str,
        new_status: ProposalStatus,
        reason: Option<&str>,
    ) -> Result<Proposal> {
        let _guard = self.lock.acquire()?;
        self.set_status_locked(id, new_status, reason)
    }

    /// Same as [`set_status`](Self::set_status) for callers already inside
    /// the repository lock's critical section.
    pub fn set_status_locked(
        &self,
        id: &str,
        new_status: ProposalStatus,
        reason: Option<&str>,
    ) -> Result<Proposal> {
        let mut proposal = self.get(id)?;

        if !transition_allowed(proposal.status, new_status) {
            return Err(EngineError::IllegalTransition {
                from: proposal.status,
                to: new_status,
            });
        }

        proposal.status = new_status;
        proposal.status_reason = reason.map(|r| r.to_string());
        if new_status == ProposalStatus::Applied {
            proposal.applied_at = Some(chrono::Utc::now().to_rfc3339());
        }

        write_record(&self.record_path(id), &proposal)?;
        info!(id, status = %new_status, "proposal status updated");
        Ok(proposal)
    }

    /// Attach the apply-attempt backup id to a proposal record.
    pub fn set_backup_id(&self, id: &str, backup_id: &str) -> Result<()> {
        let mut proposal = self.get(id)?;
        proposal.backup_id = Some(backup_id.to_string());
        write_record(&self.record_path(id), &proposal)
    }

    /// All persisted proposals, newest first.
    pub fn list(&self) -> Result<Vec<Proposal>> {
        let mut proposals: Vec<Proposal> = Vec::new();

        if !self.dir.exists() {
            return Ok(proposals);
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            proposals.push(read_record(&path, &id)?);
        }

        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskLevel;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> ProposalStore {
        let lock = RepoLock::new(tmp.path(), 1_000, 60_000);
        ProposalStore::new(tmp.path(), lock)
    }

    fn proposal(id: &str) -> Proposal {
        Proposal {
            id: id.to_string(),
            description: "test".into(),
            rationale: "because".into(),
            changes: vec![],
            risk_level: RiskLevel::Low,
            status: ProposalStatus::Pending,
            approval_token: "tok".into(),
            status_reason: None,
            backup_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            applied_at: None,
        }
    }

    #[test]
    fn test_create_and_get() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(&proposal("p1")).unwrap();
        let got = s.get("p1").unwrap();
        assert_eq!(got.status, ProposalStatus::Pending);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        assert!(matches!(
            s.get("missing").unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn test_legal_transitions() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(&proposal("p1")).unwrap();

        let p = s
            .set_status("p1", ProposalStatus::Applied, None)
            .unwrap();
        assert_eq!(p.status, ProposalStatus::Applied);
        assert!(p.applied_at.is_some());

        let p = s
            .set_status("p1", ProposalStatus::Reverted, Some("manual rollback"))
            .unwrap();
        assert_eq!(p.status, ProposalStatus::Reverted);
        assert_eq!(p.status_reason.as_deref(), Some("manual rollback"));
    }

    #[test]
    fn test_illegal_transition_rejected_and_record_untouched() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(&proposal("p1")).unwrap();
        s.set_status("p1", ProposalStatus::Rejected, Some("denied"))
            .unwrap();

        let err = s
            .set_status("p1", ProposalStatus::Applied, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::IllegalTransition { .. }));

        let p = s.get("p1").unwrap();
        assert_eq!(p.status, ProposalStatus::Rejected);
        assert_eq!(p.status_reason.as_deref(), Some("denied"));
    }

    #[test]
    fn test_list_newest_first() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);

        let mut a = proposal("a");
        a.created_at = "2026-01-01T00:00:00Z".into();
        let mut b = proposal("b");
        b.created_at = "2026-02-01T00:00:00Z".into();
        s.create(&a).unwrap();
        s.create(&b).unwrap();

        let all = s.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "b");
    }
}
