//! Transaction entity - One billing transaction, keyed by its canonical API id.
//!
//! The primary key is not assigned by the store: it is the smallest id in the
//! transaction's `id_meta.id` array. Rows are inserted on first sight and
//! overwritten on every later sync that sees the same id.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Canonical transaction id (minimum of the candidate ids)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// Transaction type as reported by the API
    pub transaction_type: Option<String>,
    /// Transaction group as reported by the API
    pub transaction_group: Option<String>,
    /// Balance bucket the transaction was charged to
    pub balance: Option<String>,
    /// Price of the transaction
    pub price: f64,
    /// Processing state (e.g. `"paid"`)
    pub state: Option<String>,
    /// When the transaction was created upstream
    pub created: DateTimeUtc,
    /// `server_meta.en.full_name`
    pub service_name: Option<String>,
    /// `server_meta.en.operation`
    pub operation: Option<String>,
    /// `server_meta.en.service`
    pub service: Option<String>,
    /// Untransformed source record
    #[sea_orm(column_type = "Json")]
    pub raw_data: Json,
    /// When this row was last refreshed
    pub fetched_at: DateTimeUtc,
}

/// `Transaction` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
