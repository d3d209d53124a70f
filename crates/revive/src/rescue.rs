//! Rescue engine: the per-item handler the execution controller drives.
//!
//! For each dunning-closed account: snapshot it, reopen it, create a
//! subscription on the rescue plan, snapshot it again. The before/after
//! pair is what makes a later rollback possible, so both snapshots are
//! captured even when the item ultimately fails.

use revive_gateway::{BillingGateway, Method};
use revive_protocol::{AccountSnapshot, AuditRecord, OutcomeStatus, WorkItem};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::rollback::already_done_message;
use crate::snapshot::snapshot_account;

pub struct RescueEngine<'a> {
    gateway: &'a dyn BillingGateway,
    plan_code: String,
    dry_run: bool,
}

impl<'a> RescueEngine<'a> {
    pub fn new(gateway: &'a dyn BillingGateway, plan_code: impl Into<String>, dry_run: bool) -> Self {
        Self {
            gateway,
            plan_code: plan_code.into(),
            dry_run,
        }
    }

    /// Rescue one account. Never returns an error: failures become `FAILED`
    /// audit records and the batch moves on.
    pub async fn process_account(&self, item: &WorkItem) -> AuditRecord {
        let code = item.code.as_str();

        let before = match snapshot_account(self.gateway, code).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(account = code, error = %err, "could not snapshot account");
                return AuditRecord {
                    id: code.to_string(),
                    status: OutcomeStatus::Failed,
                    before: None,
                    after: None,
                    error: Some(format!("{err:#}")),
                    reason: None,
                };
            }
        };

        if !before.is_closed() {
            let reason = format!(
                "account state is '{}', only closed accounts are rescued",
                before_state(&before)
            );
            return self.skipped(code, before, reason);
        }

        if self.dry_run {
            return self.skipped(
                code,
                before,
                format!(
                    "dry-run: would reopen and subscribe to plan '{}'",
                    self.plan_code
                ),
            );
        }

        if let Err(err) = self
            .gateway
            .request(Method::PUT, &format!("/accounts/{code}/reopen"), None)
            .await
        {
            // Reopening an account that is somehow open again is fine;
            // anything else, including a 404, fails the item
            if !already_done_message(err.message()) {
                return self.failed(code, before, format!("failed to reopen account: {err}"));
            }
        }

        let created = self
            .gateway
            .request(
                Method::POST,
                &format!("/accounts/{code}/subscriptions"),
                Some(json!({ "plan_code": self.plan_code })),
            )
            .await;

        let subscription_id = match created {
            Ok(response) => subscription_id_from(&response.data),
            Err(err) if err.message().contains("has already been taken") => {
                return self.skipped(code, before, "already subscribed to the rescue plan");
            }
            Err(err) => {
                return self.failed(code, before, format!("failed to create subscription: {err}"));
            }
        };

        let mut after = match snapshot_account(self.gateway, code).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // The subscription exists; an audit record without the after
                // snapshot could not be rolled back. Treat as item failure.
                return self.failed(
                    code,
                    before,
                    format!("subscribed but failed to capture after snapshot: {err:#}"),
                );
            }
        };
        after.subscription_id = subscription_id;

        info!(account = code, plan = %self.plan_code, "rescued");
        AuditRecord {
            id: code.to_string(),
            status: OutcomeStatus::Rescued,
            before: Some(before),
            after: Some(after),
            error: None,
            reason: None,
        }
    }

    fn skipped(&self, code: &str, before: AccountSnapshot, reason: impl Into<String>) -> AuditRecord {
        AuditRecord {
            id: code.to_string(),
            status: OutcomeStatus::Skipped,
            before: Some(before),
            after: None,
            error: None,
            reason: Some(reason.into()),
        }
    }

    fn failed(&self, code: &str, before: AccountSnapshot, error: impl Into<String>) -> AuditRecord {
        AuditRecord {
            id: code.to_string(),
            status: OutcomeStatus::Failed,
            before: Some(before),
            after: None,
            error: Some(error.into()),
            reason: None,
        }
    }
}

fn before_state(snapshot: &AccountSnapshot) -> &str {
    snapshot.state.as_deref().unwrap_or("unknown")
}

/// The platform answers subscription creation with either a bare object or
/// a "subscription" envelope.
fn subscription_id_from(data: &Value) -> Option<String> {
    data.get("id")
        .or_else(|| data.get("subscription").and_then(|sub| sub.get("id")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_id_parses_both_envelopes() {
        assert_eq!(
            subscription_id_from(&json!({"id": "sub_1"})),
            Some("sub_1".to_string())
        );
        assert_eq!(
            subscription_id_from(&json!({"subscription": {"id": "sub_2"}})),
            Some("sub_2".to_string())
        );
        assert_eq!(subscription_id_from(&json!({})), None);
    }
}
