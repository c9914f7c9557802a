//! Balance entity - One observed account balance.
//!
//! Balances are an observation log: every sync appends one row per balance
//! bucket reported by the API, so the table accumulates a history.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Balance database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "balances")]
pub struct Model {
    /// Surrogate identifier, assigned by the store
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Identifier of the balance as reported by the API
    pub balance_id: String,
    /// Balance bucket (e.g. `"main"`, `"bonus"`)
    pub balance_type: Option<String>,
    /// Currency code
    pub currency: String,
    /// Amount held on the balance
    pub amount: f64,
    /// Credit limit, when the API reports one
    pub credit_limit: Option<f64>,
    /// Balance status
    pub status: Option<String>,
    /// Untransformed source record
    #[sea_orm(column_type = "Json")]
    pub raw_data: Json,
    /// When this row was fetched
    pub fetched_at: DateTimeUtc,
}

/// `Balance` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
