/// Database connection and table creation
pub mod database;

/// Environment and TOML settings loading
pub mod settings;

pub use settings::{AppConfig, SyncSettings};
