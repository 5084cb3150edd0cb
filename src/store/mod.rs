//! Persistence Layer
//!
//! File-backed stores for proposals and backups, one JSON record per id,
//! written temp-then-rename so a reader never observes a half-written
//! record. Read-then-write sequences serialize through the repository
//! lock in `lock.rs`.

pub mod backups;
pub mod lock;
pub mod proposals;

pub use backups::BackupStore;
pub use lock::{RepoLock, RepoLockGuard};
pub use proposals::ProposalStore;

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Write `record` as pretty JSON at `path` with temp-then-rename atomicity.
/// The temp file lives in the same directory so the rename cannot cross a
/// filesystem boundary.
pub(crate) fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON record back. A missing file is `NotFound`; an unreadable or
/// unparsable file is `StoreCorruption` and is never silently repaired.
pub(crate) fn read_record<T: DeserializeOwned>(path: &Path, id: &str) -> Result<T> {
    if !path.exists() {
        return Err(EngineError::NotFound { id: id.to_string() });
    }

    let contents = fs::read_to_string(path).map_err(|e| EngineError::StoreCorruption {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;

    serde_json::from_str(&contents).map_err(|e| EngineError::StoreCorruption {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}
