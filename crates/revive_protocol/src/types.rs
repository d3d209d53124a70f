//! Canonical types shared by the rescue run, the rollback run, and the
//! state store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Canonical Enums (used across all crates)
// ============================================================================

/// Which kind of batch a run is. Recorded in state and results files so a
/// rollback run can be told apart from the rescue run it reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Rescue,
    Rollback,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Rescue => "rescue",
            RunMode::Rollback => "rollback",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rescue" => Ok(RunMode::Rescue),
            "rollback" => Ok(RunMode::Rollback),
            _ => Err(format!("Invalid run mode: '{}'. Expected: rescue or rollback", s)),
        }
    }
}

/// Terminal outcome of one account within a batch.
/// This is the CANONICAL definition - used in processed records, audit
/// records, and results summaries alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Account was re-subscribed to the rescue plan
    Rescued,
    /// A prior rescue was reversed
    RolledBack,
    /// Nothing to do for this account (with a reason)
    Skipped,
    /// The operation for this account failed; the batch continues
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Rescued => "RESCUED",
            OutcomeStatus::RolledBack => "ROLLED_BACK",
            OutcomeStatus::Skipped => "SKIPPED",
            OutcomeStatus::Failed => "FAILED",
        }
    }

    /// Only rescued accounts carry a remote side effect that can be reversed.
    pub fn is_reversible(&self) -> bool {
        matches!(self, OutcomeStatus::Rescued)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RESCUED" => Ok(OutcomeStatus::Rescued),
            "ROLLED_BACK" => Ok(OutcomeStatus::RolledBack),
            "SKIPPED" => Ok(OutcomeStatus::Skipped),
            "FAILED" => Ok(OutcomeStatus::Failed),
            _ => Err(format!(
                "Invalid outcome status: '{}'. Expected: RESCUED, ROLLED_BACK, SKIPPED, or FAILED",
                s
            )),
        }
    }
}

/// Invoice lifecycle state as reported by the billing platform.
///
/// The rollback engine keys its per-invoice inverse on this. States the
/// platform may add later deserialize as `Unknown` and are skipped, never
/// guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Pending,
    Processing,
    PastDue,
    Paid,
    Voided,
    Failed,
    #[serde(other)]
    Unknown,
}

impl InvoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Pending => "pending",
            InvoiceState::Processing => "processing",
            InvoiceState::PastDue => "past_due",
            InvoiceState::Paid => "paid",
            InvoiceState::Voided => "voided",
            InvoiceState::Failed => "failed",
            InvoiceState::Unknown => "unknown",
        }
    }

    /// True for states where no successful payment exists yet, so the
    /// inverse is a plain cancellation (mark failed), not a refund.
    pub fn is_collectible(&self) -> bool {
        matches!(
            self,
            InvoiceState::Pending | InvoiceState::Processing | InvoiceState::PastDue
        )
    }

    /// True once the invoice is already out of the picture.
    pub fn is_settled_noop(&self) -> bool {
        matches!(self, InvoiceState::Voided | InvoiceState::Failed)
    }
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Work items and snapshots
// ============================================================================

/// One account to process, supplied by the caller at batch start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Account code on the billing platform
    pub code: String,
    /// Remote account state at selection time, if known (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl WorkItem {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: None,
        }
    }
}

/// Point-in-time capture of an account and its billing objects.
///
/// The `after` snapshot of a rescue is the sole input rollback has for
/// reversal: it must carry the created subscription id and any invoices the
/// rescue produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account state ("active", "closed", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSnapshot>,
    #[serde(default)]
    pub invoices: Vec<InvoiceSnapshot>,
    /// Subscription created by the rescue (present in `after` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

impl AccountSnapshot {
    pub fn is_closed(&self) -> bool {
        self.state.as_deref() == Some("closed")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<InvoiceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid: Option<f64>,
}

// ============================================================================
// Audit records
// ============================================================================

/// Per-account audit entry, shared by rescue and rollback runs.
///
/// A finished run's audit records are the input of a later rollback run, so
/// rollback runs can themselves be inspected or re-rolled-back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Account code
    pub id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<AccountSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<AccountSnapshot>,
    #[serde(default)]
    pub error: Option<String>,
    /// Why the account was skipped, when it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditRecord {
    /// Invoices present in `after` but absent from `before`: the ones the
    /// rescue created, in creation order.
    pub fn new_invoices(&self) -> Vec<&InvoiceSnapshot> {
        let after = match &self.after {
            Some(snapshot) => &snapshot.invoices,
            None => return Vec::new(),
        };
        let before_ids: Vec<&str> = self
            .before
            .iter()
            .flat_map(|snapshot| snapshot.invoices.iter())
            .map(|inv| inv.id.as_str())
            .collect();
        after
            .iter()
            .filter(|inv| !before_ids.contains(&inv.id.as_str()))
            .collect()
    }
}
