//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod balance;
pub mod prediction;
pub mod project_report;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use balance::{Column as BalanceColumn, Entity as Balance, Model as BalanceModel};
pub use prediction::{Column as PredictionColumn, Entity as Prediction, Model as PredictionModel};
pub use project_report::{
    Column as ProjectReportColumn, Entity as ProjectReport, Model as ProjectReportModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
