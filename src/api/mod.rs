//! Remote billing API abstraction.
//!
//! The sync engine only needs one capability from the API: "GET this endpoint
//! with these query parameters and give me the JSON body". That capability is
//! the [`BillingSource`] trait. [`HttpBillingSource`] implements it over HTTP;
//! tests substitute a scripted in-process source.
//!
//! Response envelopes are interpreted here as well, so that every caller agrees
//! on what a successful answer looks like.

pub mod client;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SourceError;

pub use client::HttpBillingSource;

/// Endpoint paths of the billing API.
pub mod endpoints {
    /// Balances snapshot
    pub const BALANCES: &str = "/v3/balances";
    /// Spend prediction snapshot
    pub const PREDICTION: &str = "/v2/billing/prediction";
    /// Transactions by date range, paginated
    pub const TRANSACTIONS: &str = "/v2/billing/transactions";
    /// Project cost report by month
    pub const PROJECT_REPORT: &str = "/v1/billing/report/by_project/detailed";
}

/// Query parameters of one request, in the order they are sent.
pub type Query = Vec<(&'static str, String)>;

/// A read-only source of billing data.
#[async_trait]
pub trait BillingSource: Send + Sync {
    /// Fetches `endpoint` with the given query parameters and returns the
    /// decoded JSON body.
    async fn get_json(&self, endpoint: &str, query: &Query) -> Result<Value, SourceError>;
}

/// Returns the `data` member of a response whose `status` is `"success"`.
pub fn success_data<'a>(endpoint: &str, body: &'a Value) -> Result<&'a Value, SourceError> {
    match body.get("status").and_then(Value::as_str) {
        Some("success") => data_of(endpoint, body),
        other => Err(SourceError::Api {
            endpoint: endpoint.to_string(),
            status: other.map(str::to_string),
        }),
    }
}

/// Returns the `data` member of a response without checking its status.
pub fn data_of<'a>(endpoint: &str, body: &'a Value) -> Result<&'a Value, SourceError> {
    body.get("data").ok_or_else(|| SourceError::Malformed {
        endpoint: endpoint.to_string(),
        reason: "missing `data` member".to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_data() {
        let body = json!({"status": "success", "data": [1, 2]});
        assert_eq!(success_data("/x", &body).unwrap(), &json!([1, 2]));
    }

    #[test]
    fn test_success_data_rejects_other_status() {
        let body = json!({"status": "error", "data": []});
        let err = success_data("/x", &body).unwrap_err();
        assert!(matches!(err, SourceError::Api { status: Some(s), .. } if s == "error"));

        let body = json!({"data": []});
        let err = success_data("/x", &body).unwrap_err();
        assert!(matches!(err, SourceError::Api { status: None, .. }));
    }

    #[test]
    fn test_data_of_requires_data() {
        let body = json!({"status": "success"});
        assert!(matches!(
            data_of("/x", &body),
            Err(SourceError::Malformed { .. })
        ));
    }
}
