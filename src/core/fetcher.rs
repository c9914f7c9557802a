//! Period fetching - turns one planned chunk into a flat list of raw records.
//!
//! The fetcher knows the request parameters and response envelope of every
//! endpoint. It returns records as untouched JSON values; interpreting them is
//! the reconciler's job. Any failure is returned as a [`SourceError`] and the
//! orchestrator decides how far it reaches (one chunk or one stage).

use serde_json::{Map, Value};
use tracing::debug;

use crate::api::{BillingSource, Query, data_of, endpoints, success_data};
use crate::config::SyncSettings;
use crate::core::planner::{DateWindow, ReportMonth};
use crate::errors::SourceError;

/// Query parameter date format; the API expects local time without an offset.
const QUERY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Fetches raw records for one chunk at a time.
pub struct PeriodFetcher<'a, S: ?Sized> {
    source: &'a S,
    settings: &'a SyncSettings,
}

impl<'a, S> PeriodFetcher<'a, S>
where
    S: BillingSource + ?Sized,
{
    /// Creates a fetcher over `source`.
    pub const fn new(source: &'a S, settings: &'a SyncSettings) -> Self {
        Self { source, settings }
    }

    /// Fetches every transaction created inside `window`, following the
    /// offset cursor until a short page signals the end.
    ///
    /// If any page fails, the whole window fails; records of earlier pages are
    /// discarded rather than reconciled on their own. A source that repeats a
    /// full page or keeps paging past `max_pages` fails the window as well.
    pub async fn transactions(&self, window: &DateWindow) -> Result<Vec<Value>, SourceError> {
        let endpoint = endpoints::TRANSACTIONS;
        let page_size = self.settings.page_size as usize;
        let mut records: Vec<Value> = Vec::new();
        let mut offset: u64 = 0;
        let mut pages: u32 = 0;

        loop {
            if pages >= self.settings.max_pages {
                return Err(malformed(
                    endpoint,
                    &format!("window {window} did not end within {pages} pages"),
                ));
            }
            pages += 1;

            let query = self.transactions_query(window, offset);
            let body = self.source.get_json(endpoint, &query).await?;
            let page = success_data(endpoint, &body)?
                .as_array()
                .ok_or_else(|| malformed(endpoint, "`data` is not a list"))?;

            let received = page.len();
            debug!(%window, offset, received, "Fetched transactions page");

            // Only full pages continue the loop, so the previous page is the tail.
            if received == page_size
                && records.len() >= received
                && records[records.len() - received..] == page[..]
            {
                return Err(malformed(
                    endpoint,
                    &format!("offset {offset} repeated the previous page"),
                ));
            }
            records.extend(page.iter().cloned());

            if received < page_size {
                break;
            }
            offset += u64::from(self.settings.page_size);
        }

        Ok(records)
    }

    /// Fetches the per-project cost report of one month.
    pub async fn project_report(&self, period: ReportMonth) -> Result<Vec<Value>, SourceError> {
        let endpoint = endpoints::PROJECT_REPORT;
        let query: Query = vec![
            ("year", period.year.to_string()),
            ("month", period.month.to_string()),
            ("locale", self.settings.report_locale.clone()),
        ];

        let body = self.source.get_json(endpoint, &query).await?;
        let data = success_data(endpoint, &body)?;
        match data.get("projects") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(projects)) => Ok(projects.clone()),
            Some(_) => Err(malformed(endpoint, "`data.projects` is not a list")),
        }
    }

    /// Fetches the current balances, flattened across billing accounts.
    pub async fn balances(&self) -> Result<Vec<Value>, SourceError> {
        let endpoint = endpoints::BALANCES;
        let body = self.source.get_json(endpoint, &Query::new()).await?;
        let data = data_of(endpoint, &body)?;

        let Some(billings) = data.get("billings") else {
            return Ok(Vec::new());
        };
        let billings = billings
            .as_array()
            .ok_or_else(|| malformed(endpoint, "`data.billings` is not a list"))?;

        let mut balances = Vec::new();
        for billing in billings {
            match billing.get("balances") {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => balances.extend(items.iter().cloned()),
                Some(_) => return Err(malformed(endpoint, "`balances` is not a list")),
            }
        }
        Ok(balances)
    }

    /// Fetches the spend prediction, keyed by balance type.
    pub async fn predictions(&self) -> Result<Map<String, Value>, SourceError> {
        let endpoint = endpoints::PREDICTION;
        let body = self.source.get_json(endpoint, &Query::new()).await?;
        data_of(endpoint, &body)?
            .as_object()
            .cloned()
            .ok_or_else(|| malformed(endpoint, "`data` is not an object"))
    }

    fn transactions_query(&self, window: &DateWindow, offset: u64) -> Query {
        vec![
            ("created_from", window.start.format(QUERY_DATE_FORMAT).to_string()),
            ("created_to", window.end.format(QUERY_DATE_FORMAT).to_string()),
            ("balances", self.settings.transaction_balances.join(",")),
            ("offset", offset.to_string()),
            ("without_removed", "true".to_string()),
            ("limit", self.settings.page_size.to_string()),
        ]
    }
}

fn malformed(endpoint: &str, reason: &str) -> SourceError {
    SourceError::Malformed {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}
