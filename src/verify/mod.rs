//! External Verifier
//!
//! Shells out to a configured checker command (e.g. `cargo check`) after
//! files have been written, treating it as a black box that returns
//! success/failure plus human-readable diagnostics. The command is run in
//! the source root and must not mutate the files it inspects.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::VerifierConfig;
use crate::types::{Verifier, VerifyReport};

pub struct CommandVerifier {
    source_root: PathBuf,
    command: Vec<String>,
    pass_paths: bool,
}

impl CommandVerifier {
    pub fn new(source_root: PathBuf, config: &VerifierConfig) -> Self {
        CommandVerifier {
            source_root,
            command: config.command.clone(),
            pass_paths: config.pass_paths,
        }
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self, changed_paths: &[String]) -> anyhow::Result<VerifyReport> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("verifier command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.source_root);
        if self.pass_paths {
            cmd.args(changed_paths);
        }

        debug!(command = %self.command.join(" "), "running verifier");
        let output = cmd.output().await?;

        if output.status.success() {
            info!("verifier passed");
            return Ok(VerifyReport {
                ok: true,
                diagnostics: String::new(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = format!("{}{}", stdout, stderr).trim().to_string();
        info!(
            exit = output.status.code().unwrap_or(-1),
            "verifier reported failure"
        );

        Ok(VerifyReport {
            ok: false,
            diagnostics,
        })
    }
}
