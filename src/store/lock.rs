//! Repository Lock
//!
//! Cross-process advisory lock serializing every mutation of the shared
//! repository root. The lock is a zero-byte marker file under the state
//! directory, held via an exclusive OS advisory lock. Acquisition retries
//! with exponential backoff plus jitter; a marker whose holder has crashed
//! is taken over after a staleness timeout. The guard releases on `Drop`
//! so every exit path unlocks.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use fs2::FileExt;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Lock marker file name within the state directory.
const LOCK_FILENAME: &str = "repo.lock";

/// Initial backoff between acquisition attempts, in milliseconds.
const BACKOFF_BASE_MS: u64 = 25;

/// Configuration for one lock instance.
#[derive(Clone, Debug)]
pub struct RepoLock {
    path: PathBuf,
    /// Total budget for acquisition, across all retries.
    timeout: Duration,
    /// Age after which a held marker is considered abandoned.
    stale_after: Duration,
}

/// Held lock. Dropping it releases the OS lock and removes the marker.
#[derive(Debug)]
pub struct RepoLockGuard {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    pub fn new(state_dir: &Path, timeout_ms: u64, stale_ms: u64) -> Self {
        RepoLock {
            path: state_dir.join(LOCK_FILENAME),
            timeout: Duration::from_millis(timeout_ms),
            stale_after: Duration::from_millis(stale_ms),
        }
    }

    /// Acquire the lock, retrying with backoff until the timeout budget is
    /// spent. Returns [`EngineError::LockTimeout`] on exhaustion; nothing
    /// has been mutated in that case.
    pub fn acquire(&self) -> Result<RepoLockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&self.path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    // Refresh mtime so staleness is measured from this hold.
                    let _ = file.set_len(0);
                    debug!(path = %self.path.display(), "repository lock acquired");
                    return Ok(RepoLockGuard {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(_) => {
                    drop(file);

                    if self.takeover_if_stale() {
                        continue;
                    }

                    if start.elapsed() >= self.timeout {
                        return Err(EngineError::LockTimeout {
                            detail: format!(
                                "{} still held after {:.2}s ({} attempts)",
                                self.path.display(),
                                start.elapsed().as_secs_f64(),
                                attempt + 1
                            ),
                        });
                    }

                    // Exponential backoff with jitter so concurrent waiters
                    // don't synchronize their retries.
                    let base = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(5));
                    let jitter = rand::thread_rng().gen_range(0..=base / 2);
                    std::thread::sleep(Duration::from_millis(base + jitter));
                    attempt += 1;
                }
            }
        }
    }

    /// Remove the marker if its holder appears to have crashed. Returns
    /// `true` when a stale marker was cleaned up and the acquire should
    /// retry immediately.
    fn takeover_if_stale(&self) -> bool {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => return false,
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();

        if age > self.stale_after {
            warn!(
                path = %self.path.display(),
                age_secs = age.as_secs(),
                "taking over stale repository lock"
            );
            let _ = fs::remove_file(&self.path);
            return true;
        }
        false
    }
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
        debug!(path = %self.path.display(), "repository lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let lock = RepoLock::new(tmp.path(), 1_000, 60_000);

        let guard = lock.acquire().unwrap();
        assert!(tmp.path().join(LOCK_FILENAME).exists());
        drop(guard);
        assert!(!tmp.path().join(LOCK_FILENAME).exists());
    }

    #[test]
    fn test_reacquire_after_release() {
        let tmp = TempDir::new().unwrap();
        let lock = RepoLock::new(tmp.path(), 1_000, 60_000);

        drop(lock.acquire().unwrap());
        let _guard = lock.acquire().unwrap();
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let tmp = TempDir::new().unwrap();
        let lock = RepoLock::new(tmp.path(), 200, 60_000);

        let _held = lock.acquire().unwrap();

        // Second handle in the same process: fs2 advisory locks are
        // per-file-description, so a fresh open contends.
        let second = RepoLock::new(tmp.path(), 200, 60_000);
        let err = second.acquire().unwrap_err();
        assert!(matches!(err, EngineError::LockTimeout { .. }));
    }

    #[test]
    fn test_stale_marker_is_taken_over() {
        let tmp = TempDir::new().unwrap();

        // Fabricate an abandoned marker: present, locked by nobody, old.
        let marker = tmp.path().join(LOCK_FILENAME);
        fs::write(&marker, b"").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        let file = OpenOptions::new().write(true).open(&marker).unwrap();
        file.set_times(fs::FileTimes::new().set_modified(old)).unwrap();
        drop(file);

        let lock = RepoLock::new(tmp.path(), 500, 1_000);
        // Unlocked marker acquires directly; the stale path is exercised
        // when a dead process left the marker behind.
        let _guard = lock.acquire().unwrap();
    }
}
