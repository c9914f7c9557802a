//! Project report entity - Monthly cost of one project paid from one balance.
//!
//! Rows are addressed by (`year`, `month`, `project_name`, `balance_type`);
//! a unique index over those columns is created alongside the table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project report database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_reports")]
pub struct Model {
    /// Surrogate identifier, assigned by the store
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Report year
    pub year: i32,
    /// Report month, 1-based
    pub month: i32,
    /// Project name
    pub project_name: String,
    /// Balance bucket that paid for the project
    pub balance_type: String,
    /// Cost charged to the balance in that month
    pub value: f64,
    /// The project object as returned by the API
    #[sea_orm(column_type = "Json")]
    pub raw_data: Json,
    /// When this row was last refreshed
    pub fetched_at: DateTimeUtc,
}

/// `ProjectReport` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
