//! Approval Gate
//!
//! One capability -- `decide(proposal) -> approved, reason` -- with three
//! interchangeable implementations: exact token match, interactive operator
//! prompt with a fail-closed timeout, and an autonomous policy that
//! auto-approves below a risk ceiling and delegates above it. The
//! orchestrator only ever calls `decide`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dialoguer::Confirm;
use tracing::warn;

use crate::types::{ApprovalDecider, Decision, Proposal, RiskLevel};

// ---------------------------------------------------------------------------
// Token gate
// ---------------------------------------------------------------------------

/// Approves iff the caller supplies the exact approval token issued at
/// proposal creation. Behavior does not vary with risk level.
pub struct TokenGate;

#[async_trait]
impl ApprovalDecider for TokenGate {
    async fn decide(&self, proposal: &Proposal, token: Option<&str>) -> Decision {
        match token {
            Some(t) if t == proposal.approval_token => {
                Decision::approve("approval token matched")
            }
            Some(_) => Decision::deny("approval token does not match"),
            None => Decision::deny("no approval token supplied"),
        }
    }
}

// ---------------------------------------------------------------------------
// Interactive gate
// ---------------------------------------------------------------------------

/// Prompts a human operator and waits up to `timeout`. Expiry, prompt
/// failure, or a closed terminal all deny: the gate fails closed, never
/// open.
pub struct InteractiveGate {
    pub timeout: Duration,
}

impl InteractiveGate {
    pub fn new(timeout: Duration) -> Self {
        InteractiveGate { timeout }
    }

    fn render_summary(proposal: &Proposal) -> String {
        let paths: Vec<&str> = proposal.changes.iter().map(|c| c.path.as_str()).collect();
        format!(
            "[{}] {} ({} file(s): {})",
            proposal.risk_level,
            proposal.description,
            proposal.changes.len(),
            paths.join(", ")
        )
    }
}

#[async_trait]
impl ApprovalDecider for InteractiveGate {
    async fn decide(&self, proposal: &Proposal, _token: Option<&str>) -> Decision {
        let summary = Self::render_summary(proposal);

        let prompt = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(format!("Apply proposed change? {summary}"))
                .default(false)
                .interact()
        });

        match tokio::time::timeout(self.timeout, prompt).await {
            Ok(Ok(Ok(true))) => Decision::approve("operator approved"),
            Ok(Ok(Ok(false))) => Decision::deny("operator declined"),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "approval prompt failed, denying");
                Decision::deny(format!("approval prompt failed: {e}"))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "approval prompt task panicked, denying");
                Decision::deny("approval prompt failed")
            }
            Err(_) => Decision::timeout("approval timed out"),
        }
    }
}

// ---------------------------------------------------------------------------
// Autonomous-policy gate
// ---------------------------------------------------------------------------

/// "Fast mode": auto-approves `low` and `medium` proposals; anything
/// `high` or `critical` defers to the inner gate. The ceiling is fixed --
/// configuration can choose the inner gate, not bypass it.
pub struct PolicyGate {
    inner: Arc<dyn ApprovalDecider>,
}

impl PolicyGate {
    pub fn new(inner: Arc<dyn ApprovalDecider>) -> Self {
        PolicyGate { inner }
    }
}

#[async_trait]
impl ApprovalDecider for PolicyGate {
    async fn decide(&self, proposal: &Proposal, token: Option<&str>) -> Decision {
        if proposal.risk_level <= RiskLevel::Medium {
            return Decision::approve(format!(
                "auto-approved at {} risk",
                proposal.risk_level
            ));
        }
        self.inner.decide(proposal, token).await
    }
}
