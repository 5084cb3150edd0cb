//! Metamorph CLI
//!
//! Thin command surface over the self-modification engine: propose a change
//! set, apply it under the configured approval gate, roll back a committed
//! apply, and inspect proposal status or the audit ledger.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;

use metamorph::approval::{InteractiveGate, PolicyGate, TokenGate};
use metamorph::audit::JsonlAuditLog;
use metamorph::config::{self, ApprovalMode, EngineConfig};
use metamorph::engine::Engine;
use metamorph::types::{ApprovalDecider, FileChange, ProposalStatus};
use metamorph::verify::CommandVerifier;

const VERSION: &str = "0.1.0";

/// Metamorph -- self-modification engine
#[derive(Parser, Debug)]
#[command(
    name = "metamorph",
    version = VERSION,
    about = "Propose, gate, apply, verify, and roll back changes to a source tree"
)]
struct Cli {
    /// State directory (defaults to ~/.metamorph)
    #[arg(long, global = true)]
    state_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config into the state directory
    Init,
    /// Create a proposal from a JSON change-set file
    Propose {
        /// JSON file: [{"path": "...", "patch": "..."} | {"path": "...", "content": "..."}]
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        rationale: String,
    },
    /// Apply a pending proposal
    Apply {
        #[arg(long)]
        id: String,
        /// Approval token issued at proposal creation
        #[arg(long)]
        token: Option<String>,
    },
    /// Manually revert a committed apply attempt
    Rollback {
        #[arg(long)]
        apply_id: String,
    },
    /// Show a proposal's current state
    Status {
        #[arg(long)]
        id: String,
    },
    /// Render the audit report
    Report {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

/// One entry of the propose change-set file. Either a ready-made unified
/// diff or the full new content, from which the diff is derived against
/// the file's current state.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSpec {
    path: String,
    #[serde(default)]
    patch: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

fn load_or_default_config(state_dir: &PathBuf) -> EngineConfig {
    match config::load_config(state_dir) {
        Some(config) => config,
        None => {
            let mut config = EngineConfig::default();
            config.state_dir = state_dir.to_string_lossy().to_string();
            config
        }
    }
}

fn build_gate(config: &EngineConfig) -> Arc<dyn ApprovalDecider> {
    match config.approval_mode {
        ApprovalMode::Token => Arc::new(TokenGate),
        ApprovalMode::Interactive => Arc::new(InteractiveGate::new(Duration::from_millis(
            config.approval_timeout_ms,
        ))),
        // Fast mode auto-approves low/medium; high/critical still needs
        // the token.
        ApprovalMode::Auto => Arc::new(PolicyGate::new(Arc::new(TokenGate))),
    }
}

fn build_engine(config: EngineConfig) -> Engine {
    let state_dir = config.state_dir_path();
    let gate = build_gate(&config);
    let verifier = Arc::new(CommandVerifier::new(
        config.source_root_path(),
        &config.verifier,
    ));
    let audit = Arc::new(JsonlAuditLog::new(&state_dir));
    Engine::new(config, gate, verifier, audit, None)
}

fn resolve_changes(config: &EngineConfig, specs: Vec<ChangeSpec>) -> Result<Vec<FileChange>> {
    let root = config.source_root_path();
    let mut changes = Vec::with_capacity(specs.len());

    for spec in specs {
        let patch = match (spec.patch, spec.content) {
            (Some(patch), _) => patch,
            (None, Some(content)) => {
                let current = fs::read_to_string(root.join(&spec.path)).unwrap_or_default();
                metamorph::patch::diff(&current, &content)
            }
            (None, None) => {
                anyhow::bail!("change for {} has neither patch nor content", spec.path)
            }
        };
        changes.push(FileChange {
            path: spec.path,
            patch,
        });
    }
    Ok(changes)
}

fn print_status_line(status: ProposalStatus, detail: &str) {
    let label = match status {
        ProposalStatus::Pending => "pending".yellow(),
        ProposalStatus::Applied => "applied".green(),
        ProposalStatus::Rejected => "rejected".red(),
        ProposalStatus::Reverted => "reverted".red(),
    };
    println!("{label}  {detail}");
}

async fn run(cli: Cli) -> Result<()> {
    let state_dir = PathBuf::from(config::resolve_path(
        cli.state_dir.as_deref().unwrap_or("~/.metamorph"),
    ));

    match cli.command {
        Command::Init => {
            let mut defaults = EngineConfig::default();
            defaults.state_dir = state_dir.to_string_lossy().to_string();
            config::save_config(&state_dir, &defaults)?;
            println!("Wrote {}", config::config_path(&state_dir).display());
        }
        Command::Propose {
            file,
            description,
            rationale,
        } => {
            let config = load_or_default_config(&state_dir);
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read change set {}", file.display()))?;
            let specs: Vec<ChangeSpec> =
                serde_json::from_str(&raw).context("failed to parse change set")?;
            let changes = resolve_changes(&config, specs)?;

            let engine = build_engine(config);
            let outcome = engine.propose(&description, changes, &rationale).await?;

            println!("id:    {}", outcome.id);
            println!("token: {}", outcome.approval_token);
            println!("risk:  {}", outcome.risk_level);
        }
        Command::Apply { id, token } => {
            let config = load_or_default_config(&state_dir);
            let engine = build_engine(config);
            let outcome = engine.apply(&id, token.as_deref()).await?;

            print_status_line(outcome.status, &id);
            if let Some(backup_id) = &outcome.backup_id {
                println!("backup: {backup_id}");
            }
            // A reverted apply is a failed command: exit nonzero carrying
            // the verifier's diagnostics.
            outcome.into_result()?;
        }
        Command::Rollback { apply_id } => {
            let config = load_or_default_config(&state_dir);
            let engine = build_engine(config);
            let outcome = engine.rollback(&apply_id).await?;
            print_status_line(
                outcome.status,
                &format!("{} file(s) restored", outcome.restored_files),
            );
        }
        Command::Status { id } => {
            let config = load_or_default_config(&state_dir);
            let engine = build_engine(config);
            let proposal = engine.get_status(&id)?;

            print_status_line(proposal.status, &proposal.id);
            println!("description: {}", proposal.description);
            println!("risk:        {}", proposal.risk_level);
            println!("created:     {}", proposal.created_at);
            for change in &proposal.changes {
                println!("  {}", change.path);
            }
            if let Some(reason) = &proposal.status_reason {
                println!("reason:      {reason}");
            }
        }
        Command::Report { limit } => {
            let log = JsonlAuditLog::new(&state_dir);
            println!("{}", log.report(limit));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
