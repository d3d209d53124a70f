//! Rollback engine behavior against a scripted billing platform.

mod support;

use revive::rollback::RollbackEngine;
use revive_protocol::{AuditRecord, InvoiceSnapshot, InvoiceState, OutcomeStatus, SubscriptionSnapshot};
use serde_json::json;
use support::{rescued_record, MockGateway};

fn with_new_invoice(mut record: AuditRecord, invoice_id: &str) -> AuditRecord {
    if let Some(after) = record.after.as_mut() {
        after.invoices.push(InvoiceSnapshot {
            id: invoice_id.to_string(),
            state: Some(InvoiceState::Pending),
            total: Some(49.0),
            paid: None,
        });
    }
    record
}

#[tokio::test]
async fn reverses_invoice_then_subscription_then_account() {
    let gateway = MockGateway::new()
        .ok(
            "GET",
            "/invoices/inv_1",
            json!({"id": "inv_1", "state": "pending"}),
        )
        .ok("PUT", "/invoices/inv_1/mark_failed", json!({}))
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(result.error.is_none());

    // Invoices are reversed before the subscription so terminating the
    // subscription cannot void them out from under us; the account is
    // re-closed last.
    let invoice = gateway.call_index("PUT /invoices/inv_1/mark_failed").unwrap();
    let subscription = gateway.call_index("DELETE /subscriptions/sub_1").unwrap();
    let account = gateway.call_index("DELETE /accounts/acct_1").unwrap();
    assert!(invoice < subscription);
    assert!(subscription < account);
}

#[tokio::test]
async fn non_reversible_records_make_no_remote_calls() {
    let gateway = MockGateway::new();
    let record = AuditRecord {
        status: OutcomeStatus::Failed,
        ..rescued_record("acct_1", "sub_1")
    };

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::Skipped);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn dry_run_makes_no_remote_calls() {
    let gateway = MockGateway::new();
    let record = rescued_record("acct_1", "sub_1");

    let engine = RollbackEngine::new(&gateway, true);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::Skipped);
    assert!(result.reason.unwrap().starts_with("dry-run:"));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn paid_invoice_refunds_its_payment_transaction() {
    let gateway = MockGateway::new()
        .ok(
            "GET",
            "/invoices/inv_1",
            json!({
                "id": "inv_1",
                "state": "paid",
                "total": 49.0,
                "paid": 49.0,
                "transactions": [
                    {"id": "txn_pay", "type": "payment", "status": "success", "amount": 49.0}
                ]
            }),
        )
        .ok("POST", "/transactions/txn_pay/refund", json!({}))
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(gateway.was_called("POST /transactions/txn_pay/refund"));
    assert!(!gateway.was_called("POST /invoices/inv_1/refund"));
}

#[tokio::test]
async fn manually_collected_invoice_gets_credit_refund() {
    // Paid with money but no payment transaction: credit refund, then the
    // invoice is closed off with mark_paid.
    let gateway = MockGateway::new()
        .ok(
            "GET",
            "/invoices/inv_1",
            json!({"id": "inv_1", "state": "paid", "total": 49.0, "paid": 49.0}),
        )
        .ok("POST", "/invoices/inv_1/refund", json!({}))
        .ok("PUT", "/invoices/inv_1/mark_paid", json!({}))
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(gateway.was_called("POST /invoices/inv_1/refund"));
    assert!(gateway.was_called("PUT /invoices/inv_1/mark_paid"));
}

/// No mark_failed / refund / mark_paid call was issued for `invoice_id`.
fn assert_invoice_untouched(gateway: &MockGateway, invoice_id: &str) {
    assert!(!gateway.was_called(&format!("PUT /invoices/{invoice_id}/mark_failed")));
    assert!(!gateway.was_called(&format!("POST /invoices/{invoice_id}/refund")));
    assert!(!gateway.was_called(&format!("PUT /invoices/{invoice_id}/mark_paid")));
}

#[tokio::test]
async fn paid_invoice_with_no_charge_is_left_alone() {
    let gateway = MockGateway::new()
        .ok(
            "GET",
            "/invoices/inv_1",
            json!({"id": "inv_1", "state": "paid", "total": 0.0, "paid": 0.0}),
        )
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(result.notes.iter().any(|note| note.contains("no charge")));
    assert_invoice_untouched(&gateway, "inv_1");
}

#[tokio::test]
async fn voided_invoice_is_a_noop() {
    let gateway = MockGateway::new()
        .ok(
            "GET",
            "/invoices/inv_1",
            json!({"id": "inv_1", "state": "voided"}),
        )
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(result.notes.iter().any(|note| note.contains("nothing to do")));
    assert_invoice_untouched(&gateway, "inv_1");
}

#[tokio::test]
async fn unrecognized_invoice_state_is_skipped_without_mutation() {
    let gateway = MockGateway::new()
        .ok(
            "GET",
            "/invoices/inv_1",
            json!({"id": "inv_1", "state": "disputed"}),
        )
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    // The invoice is left for a human; the rest of the rollback proceeds
    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(result.notes.iter().any(|note| note.contains("skipped")));
    assert_invoice_untouched(&gateway, "inv_1");
    assert!(gateway.was_called("DELETE /subscriptions/sub_1"));
}

#[tokio::test]
async fn cancels_rather_than_terminates_when_other_subscriptions_existed() {
    let gateway = MockGateway::new()
        .ok("PUT", "/subscriptions/sub_1/cancel", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let mut record = rescued_record("acct_1", "sub_1");
    if let Some(before) = record.before.as_mut() {
        before.subscriptions.push(SubscriptionSnapshot {
            id: "sub_0".to_string(),
            state: Some("canceled".to_string()),
            plan_code: Some("legacy-annual".to_string()),
        });
    }

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(gateway.was_called("PUT /subscriptions/sub_1/cancel"));
    assert!(!gateway.was_called("DELETE /subscriptions/sub_1"));
}

#[tokio::test]
async fn already_done_answers_count_as_success() {
    let gateway = MockGateway::new()
        .err(
            "DELETE",
            "/subscriptions/sub_1",
            422,
            "Subscription has already been canceled",
        )
        .err("DELETE", "/accounts/acct_1", 404, "Couldn't find Account");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&rescued_record("acct_1", "sub_1")).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(result.notes.iter().any(|note| note.contains("already done")));
}

#[tokio::test]
async fn missing_subscription_id_is_a_hard_failure() {
    let gateway = MockGateway::new();
    let mut record = rescued_record("acct_1", "sub_1");
    if let Some(after) = record.after.as_mut() {
        after.subscription_id = None;
    }

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::Failed);
    assert!(result.error.unwrap().contains("no subscription id"));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn account_open_before_rescue_is_not_reclosed() {
    let gateway = MockGateway::new().ok("DELETE", "/subscriptions/sub_1", json!({}));
    let mut record = rescued_record("acct_1", "sub_1");
    if let Some(before) = record.before.as_mut() {
        before.state = Some("active".to_string());
    }

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(!gateway.was_called("DELETE /accounts/acct_1"));
}

#[tokio::test]
async fn invoice_reversal_failure_does_not_abort_the_item() {
    let gateway = MockGateway::new()
        .err("GET", "/invoices/inv_1", 500, "internal error")
        .ok("DELETE", "/subscriptions/sub_1", json!({}))
        .ok("DELETE", "/accounts/acct_1", json!({}));
    let record = with_new_invoice(rescued_record("acct_1", "sub_1"), "inv_1");

    let engine = RollbackEngine::new(&gateway, false);
    let result = engine.process_client(&record).await;

    assert_eq!(result.status, OutcomeStatus::RolledBack);
    assert!(result
        .notes
        .iter()
        .any(|note| note.contains("reversal failed")));
    assert!(gateway.was_called("DELETE /subscriptions/sub_1"));
}

#[tokio::test]
async fn subscription_failure_fails_item_and_batch_continues() {
    let gateway = MockGateway::new()
        .err("DELETE", "/subscriptions/sub_1", 500, "internal error")
        .ok("DELETE", "/subscriptions/sub_2", json!({}))
        .ok("DELETE", "/accounts/acct_2", json!({}));
    let records = vec![
        rescued_record("acct_1", "sub_1"),
        rescued_record("acct_2", "sub_2"),
    ];

    let engine = RollbackEngine::new(&gateway, false);
    let (results, summary) = engine
        .process_all_clients(&records, |_, _, _, _| Ok(()))
        .await
        .unwrap();

    assert_eq!(results[0].status, OutcomeStatus::Failed);
    assert_eq!(results[1].status, OutcomeStatus::RolledBack);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.rolled_back, 1);
    assert_eq!(summary.failed, 1);
    // The first item's failure stopped its own steps before the re-close
    assert!(!gateway.was_called("DELETE /accounts/acct_1"));
}
