use async_trait::async_trait;
use reqwest::{Client, header};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::api::{BillingSource, Query};
use crate::config::settings::ApiConfig;
use crate::errors::{Error, Result, SourceError};

/// Header carrying the static API token
const TOKEN_HEADER: &str = "X-Token";

/// HTTP implementation of [`BillingSource`].
pub struct HttpBillingSource {
    client: Client,
    base_url: String,
}

impl HttpBillingSource {
    /// Creates a client that sends the configured token with every request.
    pub fn new(api: &ApiConfig, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut token_value =
            header::HeaderValue::from_str(api.token.expose_secret()).map_err(|e| Error::Config {
                message: format!("BILLING_API_TOKEN is not a valid header value: {e}"),
            })?;
        token_value.set_sensitive(true);
        headers.insert(TOKEN_HEADER, token_value);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: api.base_url.clone(),
        })
    }
}

#[async_trait]
impl BillingSource for HttpBillingSource {
    async fn get_json(
        &self,
        endpoint: &str,
        query: &Query,
    ) -> std::result::Result<Value, SourceError> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(%url, ?query, "GET");

        let request_error = |source| SourceError::Request {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(request_error)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_rejects_token_with_control_characters() {
        let api = ApiConfig {
            token: SecretString::new("bad\ntoken".into()),
            base_url: "http://localhost".to_string(),
        };
        let result = HttpBillingSource::new(&api, Duration::from_secs(5));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_builds_with_valid_token() {
        let api = ApiConfig {
            token: SecretString::new("token-123".into()),
            base_url: "http://localhost".to_string(),
        };
        let source = HttpBillingSource::new(&api, Duration::from_secs(5)).unwrap();
        assert_eq!(source.base_url, "http://localhost");
    }
}
