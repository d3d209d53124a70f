//! Remote state capture.
//!
//! Builds [`AccountSnapshot`]s from the billing API and parses individual
//! invoices when rollback re-fetches them. Parsing is tolerant of the two
//! envelope shapes the platform uses (a bare array or an object keyed by
//! collection name).

use anyhow::{Context, Result};
use revive_gateway::{BillingGateway, Method};
use revive_protocol::{AccountSnapshot, InvoiceSnapshot, InvoiceState, SubscriptionSnapshot};
use serde::Deserialize;
use serde_json::Value;

/// Current remote state of one invoice, including its transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteInvoice {
    pub id: String,
    pub state: InvoiceState,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub paid: Option<f64>,
    #[serde(default)]
    pub transactions: Vec<RemoteTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTransaction {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl RemoteInvoice {
    pub fn paid_amount(&self) -> f64 {
        self.paid.unwrap_or(0.0)
    }

    /// A successful payment-type transaction, if the invoice has one.
    pub fn successful_payment(&self) -> Option<&RemoteTransaction> {
        self.transactions.iter().find(|txn| {
            txn.kind.as_deref() == Some("payment") && txn.status.as_deref() == Some("success")
        })
    }
}

/// Unwrap `{"<key>": [...]}` or a bare array into the array.
fn collection(data: &Value, key: &str) -> Vec<Value> {
    if let Some(items) = data.as_array() {
        return items.clone();
    }
    data.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Fetch the full snapshot for an account: state, subscriptions, invoices.
pub async fn snapshot_account(
    gateway: &dyn BillingGateway,
    code: &str,
) -> Result<AccountSnapshot> {
    let account = gateway
        .request(Method::GET, &format!("/accounts/{code}"), None)
        .await
        .with_context(|| format!("Failed to fetch account {code}"))?;

    let subscriptions = gateway
        .request(Method::GET, &format!("/accounts/{code}/subscriptions"), None)
        .await
        .with_context(|| format!("Failed to fetch subscriptions for {code}"))?;

    let invoices = gateway
        .request(Method::GET, &format!("/accounts/{code}/invoices"), None)
        .await
        .with_context(|| format!("Failed to fetch invoices for {code}"))?;

    let subscriptions = collection(&subscriptions.data, "subscriptions")
        .into_iter()
        .filter_map(|value| serde_json::from_value::<SubscriptionSnapshot>(value).ok())
        .collect();
    let invoices = collection(&invoices.data, "invoices")
        .into_iter()
        .filter_map(|value| serde_json::from_value::<InvoiceSnapshot>(value).ok())
        .collect();

    Ok(AccountSnapshot {
        state: account
            .data
            .get("state")
            .and_then(Value::as_str)
            .map(str::to_string),
        subscriptions,
        invoices,
        subscription_id: None,
    })
}

/// Re-fetch one invoice's current remote state. The locally cached snapshot
/// may be stale by rollback time.
pub async fn fetch_invoice(gateway: &dyn BillingGateway, invoice_id: &str) -> Result<RemoteInvoice> {
    let response = gateway
        .request(Method::GET, &format!("/invoices/{invoice_id}"), None)
        .await
        .with_context(|| format!("Failed to fetch invoice {invoice_id}"))?;
    // Invoice bodies may come wrapped in an "invoice" envelope
    let data = response
        .data
        .get("invoice")
        .cloned()
        .unwrap_or(response.data);
    serde_json::from_value(data)
        .with_context(|| format!("Unexpected invoice body for {invoice_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_invoice_parses_and_finds_payment() {
        let invoice: RemoteInvoice = serde_json::from_value(json!({
            "id": "inv_1",
            "state": "paid",
            "total": 49.0,
            "paid": 49.0,
            "transactions": [
                {"id": "txn_auth", "type": "authorization", "status": "success"},
                {"id": "txn_pay", "type": "payment", "status": "success", "amount": 49.0},
                {"id": "txn_fail", "type": "payment", "status": "declined"}
            ]
        }))
        .unwrap();

        assert_eq!(invoice.state, InvoiceState::Paid);
        assert_eq!(invoice.successful_payment().unwrap().id, "txn_pay");
    }

    #[test]
    fn collection_accepts_bare_arrays_and_envelopes() {
        let bare = json!([{"id": "sub_1"}]);
        let wrapped = json!({"subscriptions": [{"id": "sub_1"}]});
        assert_eq!(collection(&bare, "subscriptions").len(), 1);
        assert_eq!(collection(&wrapped, "subscriptions").len(), 1);
        assert_eq!(collection(&json!({}), "subscriptions").len(), 0);
    }
}
