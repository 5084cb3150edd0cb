//! Backup Store
//!
//! Durable pre-mutation snapshots, one JSON record per apply attempt at
//! `<state>/backups/<apply-id>.json`. A backup is written before any file
//! in the proposal is mutated, is immutable thereafter, and is retained
//! indefinitely for audit.

use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::types::Backup;

use super::{read_record, write_record};

/// Subdirectory of the state dir holding backup records.
const BACKUPS_DIR: &str = "backups";

pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(state_dir: &std::path::Path) -> Self {
        BackupStore {
            dir: state_dir.join(BACKUPS_DIR),
        }
    }

    fn record_path(&self, apply_id: &str) -> PathBuf {
        self.dir.join(format!("{apply_id}.json"))
    }

    /// Persist a snapshot atomically. Must complete before the first write
    /// of the apply attempt it protects.
    pub fn save(&self, backup: &Backup) -> Result<()> {
        write_record(&self.record_path(&backup.id), backup)?;
        info!(
            apply_id = %backup.id,
            files = backup.entries.len(),
            "backup persisted"
        );
        Ok(())
    }

    pub fn load(&self, apply_id: &str) -> Result<Backup> {
        read_record(&self.record_path(apply_id), apply_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::types::BackupEntry;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let s = BackupStore::new(tmp.path());

        let backup = Backup {
            id: "apply-1".into(),
            proposal_id: "p1".into(),
            entries: vec![
                BackupEntry {
                    path: "src/a.rs".into(),
                    content: Some("old".into()),
                },
                BackupEntry {
                    path: "src/new.rs".into(),
                    content: None,
                },
            ],
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        s.save(&backup).unwrap();

        let loaded = s.load("apply-1").unwrap();
        assert_eq!(loaded.proposal_id, "p1");
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].content.as_deref(), Some("old"));
        assert!(loaded.entries[1].content.is_none());
    }

    #[test]
    fn test_unknown_apply_id_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let s = BackupStore::new(tmp.path());
        assert!(matches!(
            s.load("nope").unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }
}
