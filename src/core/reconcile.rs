//! Reconciliation - writes one chunk of raw records into the store.
//!
//! Each `reconcile_*`/`record_*` function processes a whole chunk inside a
//! single database transaction. If any statement fails the function returns
//! early, the transaction is dropped uncommitted and SeaORM rolls it back, so a
//! chunk is either stored completely or not at all.
//!
//! Transactions and project reports are upserted by natural key (point lookup,
//! then update or insert). Balances and predictions are observation logs and
//! are always appended. Problems confined to a single record (no natural key,
//! a mistyped number) skip that record with a warning and never fail the chunk.

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{DatabaseConnection, Set, TransactionTrait, prelude::*};
use serde_json::{Map, Value};
use std::ops::AddAssign;
use tracing::{debug, warn};

use crate::{
    core::planner::ReportMonth,
    entities::{ProjectReport, Transaction, balance, prediction, project_report, transaction},
    errors::Result,
};

/// Currency recorded for every balance; the API reports balances in roubles.
pub const BALANCE_CURRENCY: &str = "RUB";

/// Status recorded for every observed balance.
pub const BALANCE_STATUS: &str = "active";

/// What happened to the records of one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCounts {
    /// Rows created
    pub inserted: u64,
    /// Existing rows overwritten
    pub updated: u64,
    /// Records dropped because they could not be interpreted
    pub skipped: u64,
    /// Records whose creation time was replaced by the processing time
    pub substituted_timestamps: u64,
}

impl AddAssign for ChunkCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.substituted_timestamps += other.substituted_timestamps;
    }
}

/// Derives the canonical id of a transaction: the smallest of the candidate
/// ids in `id_meta.id`.
///
/// Candidates may be JSON integers or numeric strings; anything else is
/// ignored. Returns `None` when no usable candidate exists.
#[must_use]
pub fn transaction_key(raw: &Value) -> Option<i64> {
    raw.get("id_meta")?
        .get("id")?
        .as_array()?
        .iter()
        .filter_map(as_i64)
        .min()
}

/// Parses the API's creation timestamp into UTC.
///
/// Accepts RFC 3339 (`Z` or an explicit offset, optional fractional seconds).
/// A date-time without any offset is taken to be UTC already.
#[must_use]
pub fn parse_created(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Business fields of a transaction, derived from its raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFields {
    /// Canonical transaction id
    pub id: i64,
    /// `transaction_type`
    pub transaction_type: Option<String>,
    /// `transaction_group`
    pub transaction_group: Option<String>,
    /// `balance`
    pub balance: Option<String>,
    /// `price`, zero when absent
    pub price: f64,
    /// `state`
    pub state: Option<String>,
    /// Parsed `created`; `None` when absent or unparseable
    pub created: Option<DateTime<Utc>>,
    /// `server_meta.en.full_name`
    pub service_name: Option<String>,
    /// `server_meta.en.operation`
    pub operation: Option<String>,
    /// `server_meta.en.service`
    pub service: Option<String>,
}

/// Reasons a raw transaction cannot be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    /// No usable candidate id
    MissingKey,
    /// A numeric field holds something that is not a number
    InvalidNumber(&'static str),
}

impl TransactionFields {
    /// Extracts the business fields of one raw transaction.
    pub fn from_raw(raw: &Value) -> std::result::Result<Self, RecordRejection> {
        let id = transaction_key(raw).ok_or(RecordRejection::MissingKey)?;
        let price = number_or_zero(raw.get("price")).ok_or(RecordRejection::InvalidNumber("price"))?;

        let en = raw
            .get("server_meta")
            .and_then(|meta| meta.get("en"))
            .filter(|en| en.is_object());
        let en_field = |name: &str| en.and_then(|en| string_field(en, name));

        Ok(Self {
            id,
            transaction_type: string_field(raw, "transaction_type"),
            transaction_group: string_field(raw, "transaction_group"),
            balance: string_field(raw, "balance"),
            price,
            state: string_field(raw, "state"),
            created: raw
                .get("created")
                .and_then(Value::as_str)
                .and_then(parse_created),
            service_name: en_field("full_name"),
            operation: en_field("operation"),
            service: en_field("service"),
        })
    }

    fn assign(
        self,
        active: &mut transaction::ActiveModel,
        created: DateTime<Utc>,
        raw: &Value,
        processed_at: DateTime<Utc>,
    ) {
        active.transaction_type = Set(self.transaction_type);
        active.transaction_group = Set(self.transaction_group);
        active.balance = Set(self.balance);
        active.price = Set(self.price);
        active.state = Set(self.state);
        active.created = Set(created);
        active.service_name = Set(self.service_name);
        active.operation = Set(self.operation);
        active.service = Set(self.service);
        active.raw_data = Set(raw.clone());
        active.fetched_at = Set(processed_at);
    }
}

/// Upserts one chunk of raw transactions by canonical id.
pub async fn reconcile_transactions(
    db: &DatabaseConnection,
    records: &[Value],
    processed_at: DateTime<Utc>,
) -> Result<ChunkCounts> {
    let mut counts = ChunkCounts::default();
    let txn = db.begin().await?;

    for raw in records {
        let fields = match TransactionFields::from_raw(raw) {
            Ok(fields) => fields,
            Err(reason) => {
                warn!(?reason, "Skipping transaction record");
                counts.skipped += 1;
                continue;
            }
        };

        let created = fields.created.unwrap_or_else(|| {
            warn!(
                id = fields.id,
                created = ?raw.get("created"),
                "Unparseable transaction creation time, using processing time"
            );
            counts.substituted_timestamps += 1;
            processed_at
        });

        match Transaction::find_by_id(fields.id).one(&txn).await? {
            Some(existing) => {
                let mut active: transaction::ActiveModel = existing.into();
                fields.assign(&mut active, created, raw, processed_at);
                active.update(&txn).await?;
                counts.updated += 1;
            }
            None => {
                let mut active = transaction::ActiveModel {
                    id: Set(fields.id),
                    ..Default::default()
                };
                fields.assign(&mut active, created, raw, processed_at);
                active.insert(&txn).await?;
                counts.inserted += 1;
            }
        }
    }

    txn.commit().await?;
    Ok(counts)
}

/// One (project, balance) cost line of a monthly report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine<'a> {
    /// Project name
    pub project_name: &'a str,
    /// Balance bucket that paid
    pub balance_type: &'a str,
    /// Cost, zero when absent
    pub value: f64,
    /// The whole project object the line came from
    pub project: &'a Value,
}

/// Flattens report projects into cost lines.
///
/// Returns the lines together with the number of projects or lines that had
/// to be skipped (no name, no balance, or a non-numeric value).
#[must_use]
pub fn report_lines(projects: &[Value]) -> (Vec<ReportLine<'_>>, u64) {
    let mut lines = Vec::new();
    let mut skipped = 0;

    for project in projects {
        let Some(project_name) = project
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
        else {
            warn!("Skipping report project without a name");
            skipped += 1;
            continue;
        };

        let Some(paid) = project.get("paid_by_balance").and_then(Value::as_array) else {
            continue;
        };

        for entry in paid {
            let Some(balance_type) = entry
                .get("balance")
                .and_then(Value::as_str)
                .filter(|balance| !balance.is_empty())
            else {
                debug!(project = project_name, "Skipping report line without a balance");
                skipped += 1;
                continue;
            };
            let Some(value) = number_or_zero(entry.get("value")) else {
                warn!(
                    project = project_name,
                    balance = balance_type,
                    "Skipping report line with a non-numeric value"
                );
                skipped += 1;
                continue;
            };
            lines.push(ReportLine {
                project_name,
                balance_type,
                value,
                project,
            });
        }
    }

    (lines, skipped)
}

/// Upserts the project cost lines of one report month.
pub async fn reconcile_project_reports(
    db: &DatabaseConnection,
    period: ReportMonth,
    projects: &[Value],
    processed_at: DateTime<Utc>,
) -> Result<ChunkCounts> {
    let (lines, skipped) = report_lines(projects);
    let mut counts = ChunkCounts {
        skipped,
        ..ChunkCounts::default()
    };
    // Months are 1..=12.
    #[allow(clippy::cast_possible_wrap)]
    let month = period.month as i32;

    let txn = db.begin().await?;

    for line in lines {
        let existing = ProjectReport::find()
            .filter(project_report::Column::Year.eq(period.year))
            .filter(project_report::Column::Month.eq(month))
            .filter(project_report::Column::ProjectName.eq(line.project_name))
            .filter(project_report::Column::BalanceType.eq(line.balance_type))
            .one(&txn)
            .await?;

        if let Some(report) = existing {
            let mut active: project_report::ActiveModel = report.into();
            active.value = Set(line.value);
            active.raw_data = Set(line.project.clone());
            active.fetched_at = Set(processed_at);
            active.update(&txn).await?;
            counts.updated += 1;
        } else {
            project_report::ActiveModel {
                year: Set(period.year),
                month: Set(month),
                project_name: Set(line.project_name.to_string()),
                balance_type: Set(line.balance_type.to_string()),
                value: Set(line.value),
                raw_data: Set(line.project.clone()),
                fetched_at: Set(processed_at),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            counts.inserted += 1;
        }
    }

    txn.commit().await?;
    Ok(counts)
}

/// Appends one observation per reported balance.
pub async fn record_balances(
    db: &DatabaseConnection,
    balances: &[Value],
    processed_at: DateTime<Utc>,
) -> Result<ChunkCounts> {
    let mut counts = ChunkCounts::default();
    let txn = db.begin().await?;

    for raw in balances {
        let Some(balance_id) = raw.get("balance_id").and_then(id_string) else {
            warn!("Skipping balance without a balance_id");
            counts.skipped += 1;
            continue;
        };
        let Some(amount) = number_or_zero(raw.get("value")) else {
            warn!(%balance_id, "Skipping balance with a non-numeric value");
            counts.skipped += 1;
            continue;
        };

        balance::ActiveModel {
            balance_id: Set(balance_id),
            balance_type: Set(string_field(raw, "balance_type")),
            currency: Set(BALANCE_CURRENCY.to_string()),
            amount: Set(amount),
            credit_limit: Set(raw.get("credit_limit").and_then(as_f64)),
            status: Set(Some(BALANCE_STATUS.to_string())),
            raw_data: Set(raw.clone()),
            fetched_at: Set(processed_at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        counts.inserted += 1;
    }

    txn.commit().await?;
    Ok(counts)
}

/// Appends one forecast row per balance type with a non-null prediction.
///
/// A `null` prediction means the API has no forecast for that balance; it is
/// skipped and never stored as zero.
pub async fn record_predictions(
    db: &DatabaseConnection,
    predictions: &Map<String, Value>,
    processed_at: DateTime<Utc>,
) -> Result<ChunkCounts> {
    let mut counts = ChunkCounts::default();
    let raw = Value::Object(predictions.clone());
    let txn = db.begin().await?;

    for (balance_type, predicted) in predictions {
        if predicted.is_null() {
            debug!(%balance_type, "No prediction for balance");
            counts.skipped += 1;
            continue;
        }
        let Some(amount) = as_f64(predicted) else {
            warn!(%balance_type, value = %predicted, "Skipping non-numeric prediction");
            counts.skipped += 1;
            continue;
        };

        prediction::ActiveModel {
            balance_type: Set(balance_type.clone()),
            predicted_amount: Set(amount),
            raw_data: Set(raw.clone()),
            fetched_at: Set(processed_at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        counts.inserted += 1;
    }

    txn.commit().await?;
    Ok(counts)
}

fn string_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        _ => None,
    }
}

/// Absent or `null` reads as zero; anything present must be numeric.
fn number_or_zero(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.0),
        Some(value) => as_f64(value),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}
