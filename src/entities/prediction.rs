//! Prediction entity - Spend forecast for one balance bucket.
//! Append-only: each sync adds one row per balance type with a non-null forecast.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Prediction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "predictions")]
pub struct Model {
    /// Surrogate identifier, assigned by the store
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Balance bucket the forecast applies to
    pub balance_type: String,
    /// Forecast amount
    pub predicted_amount: f64,
    /// The whole prediction map as returned by the API
    #[sea_orm(column_type = "Json")]
    pub raw_data: Json,
    /// When this row was fetched
    pub fetched_at: DateTimeUtc,
}

/// `Prediction` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
