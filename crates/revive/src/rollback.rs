//! Rollback engine: compensating transactions for a finished rescue run.
//!
//! The engine consumes the audit records of a prior run and reverses each
//! RESCUED account in three steps whose order is load-bearing:
//!
//! 1. invoice reconciliation (refund or cancel invoices the rescue created)
//! 2. subscription reversal (terminate or cancel the created subscription)
//! 3. account restoration (re-close the account if it was closed before)
//!
//! Terminating a subscription implicitly voids its pending invoices, which
//! would make those invoices unreachable for refund processing. Invoices are
//! therefore always reversed before the subscription; do not reorder.
//!
//! Every remote step is idempotent from the caller's point of view: a 404 or
//! an "already canceled/closed" answer counts as success, so a rollback
//! batch can be re-run after a partial prior failure.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use revive_gateway::{BillingGateway, GatewayError, Method};
use revive_protocol::{AuditRecord, InvoiceState, OutcomeStatus};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::snapshot::fetch_invoice;

/// Message patterns the billing platform uses for "that is already done".
/// Compatibility shim for endpoints that answer 422 instead of 404; the
/// status code is checked first.
fn already_done_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let already = r"(?i)already\s+(been\s+)?(cancell?ed|closed|terminated|voided|refunded|marked|(re)?open(ed)?|active)";
        let not_found = r"(subscription|account|invoice|transaction) not found";
        Regex::new(&format!("{already}|{not_found}")).unwrap()
    })
}

/// True when `message` says the requested change had already happened. The
/// pattern is anchored on the state word; "already exceeds its limit" and
/// the like do not match.
pub fn already_done_message(message: &str) -> bool {
    already_done_pattern().is_match(message)
}

fn is_already_done(err: &GatewayError) -> bool {
    err.is_not_found() || already_done_message(err.message())
}

/// Outcome of reversing one audit record.
#[derive(Debug, Clone)]
pub struct RollbackResult {
    pub id: String,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub error: Option<String>,
    /// Human-readable trail of what each step did
    pub notes: Vec<String>,
}

impl RollbackResult {
    fn skipped(id: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            status: OutcomeStatus::Skipped,
            reason: Some(reason.into()),
            error: None,
            notes: Vec::new(),
        }
    }

    fn failed(id: &str, error: impl Into<String>, notes: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            status: OutcomeStatus::Failed,
            reason: None,
            error: Some(error.into()),
            notes,
        }
    }

    /// Audit record for the rollback run itself, same schema as the rescue
    /// run so rollback runs can be inspected or re-rolled-back.
    pub fn to_audit_record(&self, original: &AuditRecord) -> AuditRecord {
        let reason = match (&self.reason, self.notes.is_empty()) {
            (Some(reason), _) => Some(reason.clone()),
            (None, false) => Some(self.notes.join("; ")),
            (None, true) => None,
        };
        AuditRecord {
            id: self.id.clone(),
            status: self.status,
            before: original.after.clone(),
            after: None,
            error: self.error.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    pub total: usize,
    pub rolled_back: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Mutation {
    Applied,
    /// Remote already reflects the desired end state
    AlreadyDone(String),
}

pub struct RollbackEngine<'a> {
    gateway: &'a dyn BillingGateway,
    dry_run: bool,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(gateway: &'a dyn BillingGateway, dry_run: bool) -> Self {
        Self { gateway, dry_run }
    }

    /// Reverse one audit record. Never returns an error: per-item failures
    /// become `FAILED` results and the batch moves on.
    pub async fn process_client(&self, record: &AuditRecord) -> RollbackResult {
        if !record.status.is_reversible() {
            return RollbackResult::skipped(
                &record.id,
                format!("original status {} is not reversible", record.status),
            );
        }

        if self.dry_run {
            let subscription = record
                .after
                .as_ref()
                .and_then(|after| after.subscription_id.as_deref())
                .unwrap_or("<missing>");
            return RollbackResult::skipped(
                &record.id,
                format!(
                    "dry-run: would reverse {} new invoice(s) and subscription {}",
                    record.new_invoices().len(),
                    subscription
                ),
            );
        }

        let mut notes = Vec::new();

        // Step 1: invoice reconciliation, best-effort per invoice.
        self.reverse_new_invoices(record, &mut notes).await;

        // Step 2: subscription reversal. A missing subscription id is a hard
        // failure for the item: there is nothing to reverse.
        if let Err(error) = self.reverse_subscription(record, &mut notes).await {
            return RollbackResult::failed(&record.id, error, notes);
        }

        // Step 3: account restoration.
        if let Err(error) = self.restore_account(record, &mut notes).await {
            return RollbackResult::failed(&record.id, error, notes);
        }

        info!(account = %record.id, "rolled back");
        RollbackResult {
            id: record.id.clone(),
            status: OutcomeStatus::RolledBack,
            reason: None,
            error: None,
            notes,
        }
    }

    /// Reverse the whole batch sequentially, handing each result to
    /// `on_item` (which persists it) before moving to the next record.
    pub async fn process_all_clients<F>(
        &self,
        records: &[AuditRecord],
        mut on_item: F,
    ) -> Result<(Vec<RollbackResult>, RollbackSummary)>
    where
        F: FnMut(usize, usize, &AuditRecord, &RollbackResult) -> Result<()>,
    {
        let total = records.len();
        let mut results = Vec::with_capacity(total);
        for (index, record) in records.iter().enumerate() {
            let result = self.process_client(record).await;
            on_item(index + 1, total, record, &result)?;
            results.push(result);
        }

        let count = |status| results.iter().filter(|r| r.status == status).count();
        let summary = RollbackSummary {
            total,
            rolled_back: count(OutcomeStatus::RolledBack),
            skipped: count(OutcomeStatus::Skipped),
            failed: count(OutcomeStatus::Failed),
        };
        Ok((results, summary))
    }

    /// Invoices present in `after` but not `before` were created by the
    /// rescue. Reverse each according to its *current* remote state; one
    /// invoice failing never aborts the item's rollback.
    async fn reverse_new_invoices(&self, record: &AuditRecord, notes: &mut Vec<String>) {
        for invoice in record.new_invoices() {
            match self.reverse_invoice(&invoice.id).await {
                Ok(note) => {
                    debug!(account = %record.id, invoice = %invoice.id, note, "invoice reversed");
                    notes.push(note);
                }
                Err(err) => {
                    warn!(account = %record.id, invoice = %invoice.id, error = %err, "invoice reversal failed");
                    notes.push(format!("invoice {}: reversal failed: {}", invoice.id, err));
                }
            }
        }
    }

    async fn reverse_invoice(&self, invoice_id: &str) -> Result<String> {
        let invoice = fetch_invoice(self.gateway, invoice_id).await?;

        match invoice.state {
            state if state.is_collectible() => {
                // No successful payment exists yet: cancel without a refund
                let outcome = self
                    .mutate(
                        Method::PUT,
                        &format!("/invoices/{invoice_id}/mark_failed"),
                        None,
                    )
                    .await?;
                Ok(match outcome {
                    Mutation::Applied => format!("invoice {invoice_id} marked failed"),
                    Mutation::AlreadyDone(note) => note,
                })
            }
            InvoiceState::Paid if invoice.paid_amount() > 0.0 => {
                if let Some(payment) = invoice.successful_payment() {
                    let outcome = self
                        .mutate(
                            Method::POST,
                            &format!("/transactions/{}/refund", payment.id),
                            None,
                        )
                        .await?;
                    Ok(match outcome {
                        Mutation::Applied => format!(
                            "invoice {invoice_id}: refunded transaction {}",
                            payment.id
                        ),
                        Mutation::AlreadyDone(note) => note,
                    })
                } else {
                    // Manual collection: no transaction to refund. Issue a
                    // full credit refund, then close the invoice.
                    self.mutate(
                        Method::POST,
                        &format!("/invoices/{invoice_id}/refund"),
                        Some(json!({ "type": "credit" })),
                    )
                    .await?;
                    self.mutate(
                        Method::PUT,
                        &format!("/invoices/{invoice_id}/mark_paid"),
                        None,
                    )
                    .await?;
                    Ok(format!(
                        "invoice {invoice_id}: issued credit refund and marked paid"
                    ))
                }
            }
            InvoiceState::Paid => Ok(format!("invoice {invoice_id} had no charge, left as-is")),
            state if state.is_settled_noop() => {
                Ok(format!("invoice {invoice_id} already {state}, nothing to do"))
            }
            state => {
                warn!(invoice = invoice_id, state = %state, "unrecognized invoice state, skipping");
                Ok(format!(
                    "invoice {invoice_id} in unrecognized state {state}, skipped"
                ))
            }
        }
    }

    async fn reverse_subscription(
        &self,
        record: &AuditRecord,
        notes: &mut Vec<String>,
    ) -> Result<(), String> {
        let subscription_id = record
            .after
            .as_ref()
            .and_then(|after| after.subscription_id.as_deref())
            .ok_or_else(|| {
                "no subscription id recorded in after snapshot; nothing to reverse".to_string()
            })?;

        let had_prior_subscriptions = record
            .before
            .as_ref()
            .map(|before| !before.subscriptions.is_empty())
            .unwrap_or(false);

        // Terminate (hard delete) only when the rescue created the account's
        // sole subscription; otherwise soft-cancel to preserve whatever
        // pre-existed alongside it.
        let (method, path, verb) = if had_prior_subscriptions {
            (
                Method::PUT,
                format!("/subscriptions/{subscription_id}/cancel"),
                "canceled",
            )
        } else {
            (
                Method::DELETE,
                format!("/subscriptions/{subscription_id}"),
                "terminated",
            )
        };

        match self.mutate(method, &path, None).await {
            Ok(Mutation::Applied) => {
                notes.push(format!("subscription {subscription_id} {verb}"));
                Ok(())
            }
            Ok(Mutation::AlreadyDone(note)) => {
                notes.push(note);
                Ok(())
            }
            Err(err) => Err(format!(
                "failed to reverse subscription {subscription_id}: {err}"
            )),
        }
    }

    async fn restore_account(
        &self,
        record: &AuditRecord,
        notes: &mut Vec<String>,
    ) -> Result<(), String> {
        let was_closed = record
            .before
            .as_ref()
            .map(|before| before.is_closed())
            .unwrap_or(false);
        if !was_closed {
            return Ok(());
        }

        match self
            .mutate(Method::DELETE, &format!("/accounts/{}", record.id), None)
            .await
        {
            Ok(Mutation::Applied) => {
                notes.push(format!("account {} re-closed", record.id));
                Ok(())
            }
            Ok(Mutation::AlreadyDone(note)) => {
                notes.push(note);
                Ok(())
            }
            Err(err) => Err(format!("failed to re-close account {}: {err}", record.id)),
        }
    }

    /// Issue one side-effecting call, reclassifying "already done" answers
    /// as success.
    async fn mutate(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Mutation, GatewayError> {
        match self.gateway.request(method.clone(), path, body).await {
            Ok(_) => Ok(Mutation::Applied),
            Err(err) if is_already_done(&err) => {
                debug!(%method, path, "remote already reflects desired state");
                Ok(Mutation::AlreadyDone(format!(
                    "{method} {path}: already done ({})",
                    err.message()
                )))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, message: &str) -> GatewayError {
        GatewayError::Api {
            status,
            method: "PUT".to_string(),
            path: "/subscriptions/sub_1/cancel".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn not_found_is_already_done() {
        assert!(is_already_done(&api_error(404, "not here")));
    }

    #[test]
    fn already_messages_are_already_done() {
        assert!(is_already_done(&api_error(422, "Subscription has already been canceled")));
        assert!(is_already_done(&api_error(422, "account is already closed")));
        assert!(is_already_done(&api_error(400, "subscription not found")));
        assert!(is_already_done(&api_error(422, "already cancelled")));
    }

    #[test]
    fn ordinary_errors_are_not_already_done() {
        assert!(!is_already_done(&api_error(422, "currency mismatch")));
        assert!(!is_already_done(&api_error(500, "internal error")));
    }

    #[test]
    fn already_is_anchored_to_a_state_word() {
        assert!(already_done_message("Account is already active"));
        assert!(already_done_message("has already been reopened"));
        assert!(!already_done_message("account already exceeds its limit"));
        assert!(!already_done_message("already at maximum subscriptions"));
    }
}
