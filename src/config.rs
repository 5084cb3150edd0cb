//! Engine Configuration
//!
//! Loads and saves the engine's configuration from `<state_dir>/engine.json`.
//! The source root and state directory anchor every path the engine is
//! allowed to touch; the pattern tables drive risk classification.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config file name within the state directory.
const CONFIG_FILENAME: &str = "engine.json";

/// External verifier invocation: the argv to run (in `source_root`) after
/// every apply. Exit 0 means the change is semantically acceptable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierConfig {
    pub command: Vec<String>,
    /// Append the changed paths to the argv.
    pub pass_paths: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Root of the source tree the engine may modify. Every proposed path
    /// must resolve strictly inside it.
    pub source_root: String,
    /// Directory holding proposals, backups, the audit ledger, and the
    /// repository lock marker.
    pub state_dir: String,
    /// Patterns marking load-bearing infrastructure; any match classifies
    /// the whole proposal `critical`.
    pub critical_paths: Vec<String>,
    /// Patterns marking core business logic; matches classify `high`.
    pub high_paths: Vec<String>,
    /// Which approval gate the CLI constructs: `token`, `interactive`,
    /// or `auto`.
    pub approval_mode: ApprovalMode,
    /// Interactive approval prompt timeout.
    pub approval_timeout_ms: u64,
    /// Total budget for acquiring the repository lock.
    pub lock_timeout_ms: u64,
    /// Age after which another process's lock marker is considered
    /// abandoned and may be taken over.
    pub lock_stale_ms: u64,
    /// Ceiling on the combined patch text of one proposal, in bytes.
    pub max_patch_bytes: usize,
    pub verifier: VerifierConfig,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    Token,
    Interactive,
    Auto,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            source_root: ".".to_string(),
            state_dir: "~/.metamorph".to_string(),
            critical_paths: vec![
                "src/main.rs".to_string(),
                "src/engine/**".to_string(),
                "src/store/**".to_string(),
                "Cargo.toml".to_string(),
            ],
            high_paths: vec!["src/**".to_string()],
            approval_mode: ApprovalMode::Token,
            approval_timeout_ms: 60_000,
            lock_timeout_ms: 10_000,
            lock_stale_ms: 120_000,
            max_patch_bytes: 200_000,
            verifier: VerifierConfig {
                command: vec!["cargo".to_string(), "check".to_string(), "--quiet".to_string()],
                pass_paths: false,
            },
        }
    }
}

impl EngineConfig {
    /// Absolute, `~`-expanded state directory.
    pub fn state_dir_path(&self) -> PathBuf {
        PathBuf::from(resolve_path(&self.state_dir))
    }

    /// Absolute, `~`-expanded source root.
    pub fn source_root_path(&self) -> PathBuf {
        PathBuf::from(resolve_path(&self.source_root))
    }
}

/// Returns the full path to the engine config file inside `state_dir`.
pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILENAME)
}

/// Load the engine config from disk, merging missing fields with defaults.
///
/// Returns `None` if the config file does not exist or cannot be parsed.
pub fn load_config(state_dir: &Path) -> Option<EngineConfig> {
    let path = config_path(state_dir);
    if !path.exists() {
        return None;
    }

    let contents = fs::read_to_string(&path).ok()?;
    let mut config: EngineConfig = serde_json::from_str(&contents).ok()?;

    // Merge defaults for unset fields
    let defaults = EngineConfig::default();

    if config.source_root.is_empty() {
        config.source_root = defaults.source_root;
    }
    if config.state_dir.is_empty() {
        config.state_dir = defaults.state_dir;
    }
    if config.approval_timeout_ms == 0 {
        config.approval_timeout_ms = defaults.approval_timeout_ms;
    }
    if config.lock_timeout_ms == 0 {
        config.lock_timeout_ms = defaults.lock_timeout_ms;
    }
    if config.lock_stale_ms == 0 {
        config.lock_stale_ms = defaults.lock_stale_ms;
    }
    if config.max_patch_bytes == 0 {
        config.max_patch_bytes = defaults.max_patch_bytes;
    }
    if config.verifier.command.is_empty() {
        config.verifier = defaults.verifier;
    }

    Some(config)
}

/// Save the engine config to `<state_dir>/engine.json`, creating the state
/// directory if needed.
pub fn save_config(state_dir: &Path, config: &EngineConfig) -> Result<()> {
    if !state_dir.exists() {
        fs::create_dir_all(state_dir).context("Failed to create state directory")?;
    }

    let path = config_path(state_dir);
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, &json).context("Failed to write config file")?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }

    #[test]
    fn test_defaults_mark_engine_internals_critical() {
        let config = EngineConfig::default();
        assert!(config.critical_paths.iter().any(|p| p == "src/main.rs"));
        assert!(config.critical_paths.iter().any(|p| p == "src/store/**"));
        assert_eq!(config.approval_mode, ApprovalMode::Token);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.source_root = "/repo".to_string();
        config.lock_timeout_ms = 5_000;

        save_config(tmp.path(), &config).unwrap();
        let loaded = load_config(tmp.path()).unwrap();

        assert_eq!(loaded.source_root, "/repo");
        assert_eq!(loaded.lock_timeout_ms, 5_000);
        assert_eq!(loaded.max_patch_bytes, config.max_patch_bytes);
    }

    #[test]
    fn test_load_merges_defaults_for_unset_fields() {
        let tmp = TempDir::new().unwrap();
        let raw = r#"{
            "sourceRoot": "/repo",
            "stateDir": "",
            "criticalPaths": [],
            "highPaths": [],
            "approvalMode": "auto",
            "approvalTimeoutMs": 0,
            "lockTimeoutMs": 0,
            "lockStaleMs": 0,
            "maxPatchBytes": 0,
            "verifier": { "command": [], "passPaths": false }
        }"#;
        fs::write(config_path(tmp.path()), raw).unwrap();

        let loaded = load_config(tmp.path()).unwrap();
        assert_eq!(loaded.approval_mode, ApprovalMode::Auto);
        assert_eq!(loaded.lock_timeout_ms, EngineConfig::default().lock_timeout_ms);
        assert!(!loaded.verifier.command.is_empty());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_config(tmp.path()).is_none());
    }
}
