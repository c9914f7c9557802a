//! Shared test utilities for the billing sync.
//!
//! This module provides an in-memory database with all tables created, a
//! scripted [`BillingSource`] and builders for realistic API payloads.

use crate::{
    api::{BillingSource, Query},
    errors::{Result, SourceError},
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Routes test logs through the test harness writer.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

enum Scripted {
    Body(Value),
    HttpStatus(u16),
}

/// A [`BillingSource`] that replays queued responses per endpoint.
///
/// Responses for an endpoint are served in the order they were pushed. An
/// endpoint with nothing queued answers HTTP 404, so unexpected calls show up
/// as fetch failures. Every call is recorded for later inspection.
#[derive(Default)]
pub struct StubSource {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl StubSource {
    /// Creates a source with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful JSON body for `endpoint`.
    pub fn push_ok(&self, endpoint: &str, body: Value) {
        self.push(endpoint, Scripted::Body(body));
    }

    /// Queues an HTTP error status for `endpoint`.
    pub fn push_err(&self, endpoint: &str, status: u16) {
        self.push(endpoint, Scripted::HttpStatus(status));
    }

    /// Every call made so far, as (endpoint, query) pairs.
    pub fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Calls made to one endpoint.
    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(called, _)| called == endpoint)
            .count()
    }

    fn push(&self, endpoint: &str, response: Scripted) {
        if let Ok(mut responses) = self.responses.lock() {
            responses
                .entry(endpoint.to_string())
                .or_default()
                .push_back(response);
        }
    }
}

#[async_trait]
impl BillingSource for StubSource {
    async fn get_json(
        &self,
        endpoint: &str,
        query: &Query,
    ) -> std::result::Result<Value, SourceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                endpoint.to_string(),
                query
                    .iter()
                    .map(|(key, value)| ((*key).to_string(), value.clone()))
                    .collect(),
            ));
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.get_mut(endpoint)?.pop_front());

        match next {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::HttpStatus(status)) => Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status,
                body: "scripted failure".to_string(),
            }),
            None => Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status: 404,
                body: "nothing scripted".to_string(),
            }),
        }
    }
}

/// A raw transaction as returned by the transactions endpoint.
pub fn tx_record(ids: &[i64], price: f64, state: &str) -> Value {
    json!({
        "id_meta": {"id": ids},
        "transaction_type": "charge",
        "transaction_group": "cloud",
        "balance": "main",
        "price": price,
        "state": state,
        "created": "2025-03-01T09:15:00Z",
        "server_meta": {
            "en": {
                "full_name": "Cloud server",
                "operation": "usage",
                "service": "vpc"
            },
            "ru": {
                "full_name": "Облачный сервер"
            }
        }
    })
}

/// A successful transactions page.
pub fn transactions_page(records: Vec<Value>) -> Value {
    json!({"status": "success", "data": records})
}

/// A project object of the monthly report.
pub fn report_project(name: &str, paid: &[(&str, Value)]) -> Value {
    let paid_by_balance: Vec<Value> = paid
        .iter()
        .map(|(balance, value)| json!({"balance": balance, "value": value}))
        .collect();
    json!({"name": name, "paid_by_balance": paid_by_balance})
}

/// A successful project report response.
pub fn report_response(projects: Vec<Value>) -> Value {
    json!({"status": "success", "data": {"projects": projects}})
}

/// A balances response with one billing account.
pub fn balances_response(balances: Vec<Value>) -> Value {
    json!({"data": {"billings": [{"balances": balances}]}})
}

/// A prediction response.
pub fn prediction_response(data: Value) -> Value {
    json!({"data": data})
}
