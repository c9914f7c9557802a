//! Database configuration module for the billing sync.
//!
//! This module resolves the connection string, opens the SeaORM connection and
//! creates all tables from the entity definitions. Tables are created with
//! `IF NOT EXISTS` so the scheduler can call [`create_tables`] on every start.
//! The project-report natural key is backed by a unique index.

use crate::entities::{Balance, Prediction, ProjectReport, ProjectReportColumn, Transaction};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

use super::settings::DEFAULT_DATABASE_URL;

/// Name of the unique index over the project report natural key
pub const PROJECT_REPORT_KEY_INDEX: &str = "idx_project_reports_natural_key";

/// Resolves the database URL from a variable lookup.
///
/// `DATABASE_URL` wins. Otherwise, when `DB_HOST` is set, a PostgreSQL URL is
/// assembled from `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER` and
/// `DB_PASSWORD`. Without either a local `SQLite` file is used.
pub fn database_url_from<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL") {
        return url;
    }

    lookup("DB_HOST").map_or_else(
        || DEFAULT_DATABASE_URL.to_string(),
        |host| {
            let port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());
            let name = lookup("DB_NAME").unwrap_or_else(|| "billing".to_string());
            let user = lookup("DB_USER").unwrap_or_else(|| "billing".to_string());
            let password = lookup("DB_PASSWORD").unwrap_or_default();
            format!("postgres://{user}:{password}@{host}:{port}/{name}")
        },
    )
}

/// Establishes a connection to the configured database.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database");
    let db = Database::connect(database_url).await?;
    info!(backend = ?db.get_database_backend(), "Database connection established");
    Ok(db)
}

/// Creates all tables (if missing) and the project report unique index.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, Balance).await?;
    create_table(db, &schema, Prediction).await?;
    create_table(db, &schema, Transaction).await?;
    create_table(db, &schema, ProjectReport).await?;

    let report_key = Index::create()
        .name(PROJECT_REPORT_KEY_INDEX)
        .table(ProjectReport)
        .col(ProjectReportColumn::Year)
        .col(ProjectReportColumn::Month)
        .col(ProjectReportColumn::ProjectName)
        .col(ProjectReportColumn::BalanceType)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&report_key)).await?;

    debug!("Database tables ensured");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(db.get_database_backend().build(&table)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BalanceModel, PredictionModel, ProjectReportModel, TransactionModel};
    use sea_orm::{EntityTrait, QuerySelect};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<BalanceModel> = Balance::find().limit(1).all(&db).await?;
        let _: Vec<PredictionModel> = Prediction::find().limit(1).all(&db).await?;
        let _: Vec<TransactionModel> = Transaction::find().limit(1).all(&db).await?;
        let _: Vec<ProjectReportModel> = ProjectReport::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_database_url_precedence() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_HOST", "db.internal"),
        ]);
        let lookup = |name: &str| vars.get(name).map(|v| (*v).to_string());
        assert_eq!(database_url_from(&lookup), "sqlite::memory:");
    }

    #[test]
    fn test_database_url_from_parts() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "billing_reports"),
            ("DB_USER", "etl"),
            ("DB_PASSWORD", "pw"),
        ]);
        let lookup = |name: &str| vars.get(name).map(|v| (*v).to_string());
        assert_eq!(
            database_url_from(&lookup),
            "postgres://etl:pw@db.internal:5432/billing_reports"
        );
    }

    #[test]
    fn test_database_url_default() {
        let lookup = |_: &str| -> Option<String> { None };
        assert_eq!(database_url_from(&lookup), DEFAULT_DATABASE_URL);
    }
}
