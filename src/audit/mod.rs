//! Audit Ledger
//!
//! Append-only episodic log of apply outcomes, one JSON line per record at
//! `<state>/audit.jsonl`. Recording is fire-and-forget: a failed append is
//! logged and swallowed, never allowed to roll back a committed apply.
//! Also renders the human-readable audit report for the CLI.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{AuditSink, ProposalStatus, RiskLevel};

/// Ledger file name within the state directory.
const AUDIT_FILENAME: &str = "audit.jsonl";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub apply_id: String,
    pub description: String,
    pub outcome: ProposalStatus,
    pub risk_level: RiskLevel,
    pub timestamp: String,
}

pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(state_dir: &std::path::Path) -> Self {
        JsonlAuditLog {
            path: state_dir.join(AUDIT_FILENAME),
        }
    }

    fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read back the most recent `limit` records, newest first. Unparsable
    /// lines are skipped; the report is best-effort by design.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let mut records: Vec<AuditRecord> = contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        records.reverse();
        records.truncate(limit);
        records
    }

    /// Generate a human-readable report summarizing recent apply activity.
    pub fn report(&self, limit: usize) -> String {
        let records = self.recent(limit);

        if records.is_empty() {
            return "No apply attempts recorded.".to_string();
        }

        let mut report = String::from("=== Self-Modification Audit Report ===\n\n");
        report.push_str(&format!("Total entries shown: {}\n\n", records.len()));

        let mut outcome_counts: std::collections::HashMap<String, u32> =
            std::collections::HashMap::new();
        for r in &records {
            *outcome_counts.entry(r.outcome.to_string()).or_insert(0) += 1;
        }

        report.push_str("Breakdown by outcome:\n");
        for (outcome, count) in &outcome_counts {
            report.push_str(&format!("  {}: {}\n", outcome, count));
        }
        report.push('\n');

        report.push_str("Recent entries:\n");
        for r in &records {
            report.push_str(&format!(
                "  [{}] {} ({}) - {}\n",
                r.timestamp, r.outcome, r.risk_level, r.description,
            ));
        }

        report
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn record(
        &self,
        apply_id: &str,
        description: &str,
        outcome: ProposalStatus,
        risk_level: RiskLevel,
    ) {
        let record = AuditRecord {
            apply_id: apply_id.to_string(),
            description: description.to_string(),
            outcome,
            risk_level,
            timestamp: Utc::now().to_rfc3339(),
        };

        if let Err(e) = self.append(&record) {
            warn!(apply_id, error = %e, "failed to append audit record");
        }
    }
}
