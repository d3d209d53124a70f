#![allow(dead_code)]

//! Scripted gateway for engine tests: canned responses per route, every
//! call recorded in order.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use revive_gateway::{BillingGateway, GatewayError, GatewayResponse, Method};
use revive_protocol::{AccountSnapshot, AuditRecord, OutcomeStatus};
use serde_json::Value;

#[derive(Clone)]
enum Canned {
    Ok(Value),
    Err { status: u16, message: String },
}

#[derive(Default)]
pub struct MockGateway {
    routes: Mutex<HashMap<String, VecDeque<Canned>>>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a 200 response for `METHOD path`. Scripting the same route
    /// again queues a follow-up response; the last one repeats.
    pub fn ok(self, method: &str, path: &str, body: Value) -> Self {
        self.push(method, path, Canned::Ok(body));
        self
    }

    /// Script an API error for `METHOD path`.
    pub fn err(self, method: &str, path: &str, status: u16, message: &str) -> Self {
        self.push(
            method,
            path,
            Canned::Err {
                status,
                message: message.to_string(),
            },
        );
        self
    }

    fn push(&self, method: &str, path: &str, canned: Canned) {
        self.routes
            .lock()
            .unwrap()
            .entry(format!("{method} {path}"))
            .or_default()
            .push_back(canned);
    }

    /// Every call made so far, as "METHOD path", in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_index(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|made| made == call)
    }

    pub fn was_called(&self, call: &str) -> bool {
        self.call_index(call).is_some()
    }
}

#[async_trait]
impl BillingGateway for MockGateway {
    async fn request(
        &self,
        method: Method,
        path: &str,
        _body: Option<Value>,
    ) -> Result<GatewayResponse, GatewayError> {
        let key = format!("{method} {path}");
        self.calls.lock().unwrap().push(key.clone());

        let canned = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap_or(Canned::Ok(Value::Null)),
                None => Canned::Err {
                    status: 500,
                    message: format!("no scripted response for {key}"),
                },
            }
        };

        match canned {
            Canned::Ok(data) => Ok(GatewayResponse {
                data,
                status_code: 200,
            }),
            Canned::Err { status, message } => Err(GatewayError::Api {
                status,
                method: method.to_string(),
                path: path.to_string(),
                message,
            }),
        }
    }
}

/// A RESCUED audit record: `code` was closed with no subscriptions before,
/// and the rescue created subscription `subscription_id`.
pub fn rescued_record(code: &str, subscription_id: &str) -> AuditRecord {
    AuditRecord {
        id: code.to_string(),
        status: OutcomeStatus::Rescued,
        before: Some(AccountSnapshot {
            state: Some("closed".to_string()),
            subscriptions: Vec::new(),
            invoices: Vec::new(),
            subscription_id: None,
        }),
        after: Some(AccountSnapshot {
            state: Some("active".to_string()),
            subscriptions: Vec::new(),
            invoices: Vec::new(),
            subscription_id: Some(subscription_id.to_string()),
        }),
        error: None,
        reason: None,
    }
}
