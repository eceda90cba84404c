/// Database configuration and connection management
pub mod database;

/// Settings loading from purchasing.toml
pub mod settings;

pub use settings::{LedgerSettings, PurchasingSettings, Settings};
