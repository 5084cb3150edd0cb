//! Apply Orchestrator
//!
//! The top-level state machine of the self-modification engine. A proposal
//! moves `pending -> (gate) -> writing -> verifying -> applied`, or is
//! rejected by the gate, or is reverted when verification fails. All file
//! mutation happens inside the repository lock's critical section, with a
//! backup persisted before the first write so every failure path can
//! restore the tree byte-for-byte.

pub mod paths;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rand::RngCore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::risk::RiskClassifier;
use crate::store::{BackupStore, ProposalStore, RepoLock};
use crate::types::{
    ApplyOutcome, ApprovalDecider, AuditSink, Backup, BackupEntry, FileChange, Proposal,
    ProposalStatus, ProposeOutcome, RiskJudge, RollbackOutcome, Verifier, VerifyReport,
};
use crate::patch;

/// The self-modification engine. Constructed once at process start with
/// explicit collaborators; holds no global state.
pub struct Engine {
    config: EngineConfig,
    source_root: PathBuf,
    proposals: ProposalStore,
    backups: BackupStore,
    classifier: RiskClassifier,
    lock: RepoLock,
    gate: Arc<dyn ApprovalDecider>,
    verifier: Arc<dyn Verifier>,
    audit: Arc<dyn AuditSink>,
    judge: Option<Arc<dyn RiskJudge>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        gate: Arc<dyn ApprovalDecider>,
        verifier: Arc<dyn Verifier>,
        audit: Arc<dyn AuditSink>,
        judge: Option<Arc<dyn RiskJudge>>,
    ) -> Self {
        let state_dir = config.state_dir_path();
        let lock = RepoLock::new(&state_dir, config.lock_timeout_ms, config.lock_stale_ms);
        Engine {
            source_root: config.source_root_path(),
            proposals: ProposalStore::new(&state_dir, lock.clone()),
            backups: BackupStore::new(&state_dir),
            classifier: RiskClassifier::from_config(&config),
            lock,
            config,
            gate,
            verifier,
            audit,
            judge,
        }
    }

    // ─── propose ─────────────────────────────────────────────────

    /// Validate, risk-classify, and persist a new proposal. Nothing invalid
    /// ever reaches disk: path containment and the patch-size ceiling are
    /// checked before the record is written.
    pub async fn propose(
        &self,
        description: &str,
        changes: Vec<FileChange>,
        rationale: &str,
    ) -> Result<ProposeOutcome> {
        if changes.is_empty() {
            return Err(EngineError::InvalidPath {
                path: String::new(),
                reason: "proposal contains no changes".to_string(),
            });
        }

        for change in &changes {
            paths::contain(&self.source_root, &change.path)?;
        }

        let total_bytes: usize = changes.iter().map(|c| c.patch.len()).sum();
        if total_bytes > self.config.max_patch_bytes {
            return Err(EngineError::PatchTooLarge {
                size: total_bytes,
                max: self.config.max_patch_bytes,
            });
        }

        let touched: Vec<String> = changes.iter().map(|c| c.path.clone()).collect();
        let judged = match &self.judge {
            Some(judge) => judge.judge(description, &touched).await,
            None => None,
        };
        let risk_level = self.classifier.classify_with_judgment(&touched, judged);

        let proposal = Proposal {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            rationale: rationale.to_string(),
            changes,
            risk_level,
            status: ProposalStatus::Pending,
            approval_token: generate_token(),
            status_reason: None,
            backup_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            applied_at: None,
        };

        self.proposals.create(&proposal)?;
        info!(id = %proposal.id, risk = %risk_level, files = proposal.changes.len(), "proposal created");

        Ok(ProposeOutcome {
            id: proposal.id,
            approval_token: proposal.approval_token,
            risk_level,
        })
    }

    // ─── apply ───────────────────────────────────────────────────

    /// Run one apply attempt: gate, lock, snapshot, write, verify, then
    /// commit or roll back. A proposal already in a terminal state returns
    /// that state without touching any file.
    pub async fn apply(&self, id: &str, token: Option<&str>) -> Result<ApplyOutcome> {
        let proposal = self.proposals.get(id)?;

        if proposal.status.is_terminal() {
            info!(id, status = %proposal.status, "apply on terminal proposal is a no-op");
            return Ok(ApplyOutcome {
                status: proposal.status,
                backup_id: proposal.backup_id,
                diagnostics: proposal.status_reason,
            });
        }

        // 1. Gate. Denied means rejected before any file is touched; a
        // timed-out prompt leaves the proposal pending and retryable.
        let decision = self.gate.decide(&proposal, token).await;
        if !decision.approved {
            if decision.timed_out {
                warn!(id, "approval timed out, proposal left pending");
                return Err(EngineError::ApprovalTimeout);
            }
            info!(id, reason = %decision.reason, "approval denied");
            self.proposals
                .set_status(id, ProposalStatus::Rejected, Some(&decision.reason))?;
            return Err(EngineError::ApprovalDenied {
                reason: decision.reason,
            });
        }

        // 2. Serialize against every other apply attempt on this root.
        let _guard = self.lock.acquire()?;

        // 3. Snapshot current content for every target before anything is
        // written. A read failure here aborts with no side effects.
        let mut targets: Vec<(String, PathBuf)> = Vec::with_capacity(proposal.changes.len());
        let mut entries: Vec<BackupEntry> = Vec::with_capacity(proposal.changes.len());
        for change in &proposal.changes {
            let target = paths::contain(&self.source_root, &change.path)?;
            let content = read_if_present(&target)?;
            entries.push(BackupEntry {
                path: change.path.clone(),
                content,
            });
            targets.push((change.path.clone(), target));
        }

        // 4. Stage all new contents in memory before the first write, so a
        // drifted hunk can never leave a partially-applied proposal.
        let mut staged: Vec<String> = Vec::with_capacity(proposal.changes.len());
        for (change, entry) in proposal.changes.iter().zip(&entries) {
            let original = entry.content.as_deref().unwrap_or("");
            let new_content =
                patch::apply(original, &change.patch).map_err(|e| EngineError::HunkMismatch {
                    path: change.path.clone(),
                    detail: e.to_string(),
                })?;
            staged.push(new_content);
        }

        let apply_id = Uuid::new_v4().to_string();
        let backup = Backup {
            id: apply_id.clone(),
            proposal_id: proposal.id.clone(),
            entries,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.backups.save(&backup)?;
        self.proposals.set_backup_id(id, &apply_id)?;

        // 5. Write every file temp-then-rename. On a write failure the
        // files already written in this attempt are restored from the
        // just-taken backup and the proposal stays pending.
        for (written, ((_, target), content)) in targets.iter().zip(&staged).enumerate() {
            if let Err(e) = write_target(target, content) {
                error!(id, path = %target.display(), error = %e, "write failed, restoring attempt");
                self.restore_entries(&backup.entries[..=written])?;
                return Err(EngineError::Io(e));
            }
        }

        // 6. Verify. An unrunnable verifier reverts the same way a failing
        // one does: an unverified change never remains live.
        let touched: Vec<String> = targets.iter().map(|(rel, _)| rel.clone()).collect();
        let report = match self.verifier.verify(&touched).await {
            Ok(report) => report,
            Err(e) => VerifyReport {
                ok: false,
                diagnostics: format!("verifier could not run: {e}"),
            },
        };

        if report.ok {
            let updated =
                self.proposals
                    .set_status_locked(id, ProposalStatus::Applied, None)?;
            info!(id, %apply_id, "proposal applied");
            self.audit
                .record(&apply_id, &proposal.description, updated.status, proposal.risk_level)
                .await;
            return Ok(ApplyOutcome {
                status: ProposalStatus::Applied,
                backup_id: Some(apply_id),
                diagnostics: None,
            });
        }

        // 7. Full rollback: every touched file back to its pre-apply bytes.
        warn!(id, %apply_id, "verification failed, rolling back");
        self.restore_entries(&backup.entries)?;
        let reason = format!("verification failed: {}", report.diagnostics);
        self.proposals
            .set_status_locked(id, ProposalStatus::Reverted, Some(&reason))?;
        self.audit
            .record(
                &apply_id,
                &proposal.description,
                ProposalStatus::Reverted,
                proposal.risk_level,
            )
            .await;

        Ok(ApplyOutcome {
            status: ProposalStatus::Reverted,
            backup_id: Some(apply_id),
            diagnostics: Some(report.diagnostics),
        })
    }

    // ─── rollback ────────────────────────────────────────────────

    /// Manual revert of a committed apply attempt. Restores every file in
    /// the backup and transitions the owning proposal `applied -> reverted`.
    pub async fn rollback(&self, apply_id: &str) -> Result<RollbackOutcome> {
        let backup = self.backups.load(apply_id)?;
        let _guard = self.lock.acquire()?;

        let proposal = self.proposals.get(&backup.proposal_id)?;
        if proposal.status != ProposalStatus::Applied {
            return Err(EngineError::IllegalTransition {
                from: proposal.status,
                to: ProposalStatus::Reverted,
            });
        }

        self.restore_entries(&backup.entries)?;
        self.proposals.set_status_locked(
            &backup.proposal_id,
            ProposalStatus::Reverted,
            Some("manual rollback"),
        )?;
        info!(apply_id, proposal_id = %backup.proposal_id, "manual rollback complete");
        self.audit
            .record(
                apply_id,
                &proposal.description,
                ProposalStatus::Reverted,
                proposal.risk_level,
            )
            .await;

        Ok(RollbackOutcome {
            status: ProposalStatus::Reverted,
            restored_files: backup.entries.len() as u32,
        })
    }

    // ─── status ──────────────────────────────────────────────────

    pub fn get_status(&self, id: &str) -> Result<Proposal> {
        self.proposals.get(id)
    }

    // ─── internals ───────────────────────────────────────────────

    /// Put every entry's file back to its snapshotted state: rewrite the
    /// recorded bytes, or delete files the snapshot marked absent.
    fn restore_entries(&self, entries: &[BackupEntry]) -> Result<()> {
        for entry in entries {
            let target = paths::contain(&self.source_root, &entry.path)?;
            match &entry.content {
                Some(content) => write_target(&target, content)?,
                None => match fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(EngineError::Io(e)),
                },
            }
        }
        Ok(())
    }
}

/// Read a file's content, mapping "does not exist" to `None` (the backup's
/// absent sentinel) and propagating every other error.
fn read_if_present(path: &std::path::Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::Io(e)),
    }
}

/// Write a target file temp-then-rename, creating parent directories.
fn write_target(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("mmtmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

/// Random, unguessable, single-use approval credential.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
