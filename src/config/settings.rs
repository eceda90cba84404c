//! Application settings loaded from a TOML file.
//!
//! Every key has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! [ledger]
//! inventory_account_code = "1300"
//! cash_account_code = "1000"
//!
//! [purchasing]
//! honor_tax_override = true
//! ```

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default settings file name
pub const DEFAULT_SETTINGS_PATH: &str = "purchasing.toml";

/// All settings of the purchasing core
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chart of accounts used for postings
    pub ledger: LedgerSettings,
    /// Purchase order behaviour
    pub purchasing: PurchasingSettings,
}

/// Account codes and names the services post to
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Code of the Inventory asset account
    pub inventory_account_code: String,
    /// Name given to the Inventory account when it is created
    pub inventory_account_name: String,
    /// Code of the default cash account
    pub cash_account_code: String,
    /// Name given to the cash account when it is created
    pub cash_account_name: String,
    /// Prefix of generated supplier payable codes, `<prefix>-<supplier_id>`
    pub payable_account_prefix: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            inventory_account_code: "1300".to_string(),
            inventory_account_name: "Inventory".to_string(),
            cash_account_code: "1000".to_string(),
            cash_account_name: "Cash".to_string(),
            payable_account_prefix: "2100".to_string(),
        }
    }
}

/// Purchase order settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PurchasingSettings {
    /// When true, an explicit order `tax_amount` replaces the tax summed from the lines
    pub honor_tax_override: bool,
}

impl Default for PurchasingSettings {
    fn default() -> Self {
        Self {
            honor_tax_override: true,
        }
    }
}

impl Settings {
    /// Rejects settings the services cannot work with.
    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;
        for (key, value) in [
            ("inventory_account_code", &ledger.inventory_account_code),
            ("cash_account_code", &ledger.cash_account_code),
            ("payable_account_prefix", &ledger.payable_account_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("ledger.{key} cannot be empty"),
                });
            }
        }
        if ledger.inventory_account_code == ledger.cash_account_code {
            return Err(Error::Config {
                message: "inventory and cash accounts must use different codes".to_string(),
            });
        }
        Ok(())
    }
}

/// Parses and validates settings from a TOML string.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or
/// [`Settings::validate`] fails.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading settings from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {}: {e}", path_ref.display()),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `PURCHASING_CONFIG` (or [`DEFAULT_SETTINGS_PATH`]),
/// using defaults when that file does not exist.
pub fn load_app_settings() -> Result<Settings> {
    let path = std::env::var("PURCHASING_CONFIG")
        .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    if Path::new(&path).exists() {
        load_settings(&path)
    } else {
        tracing::info!("No settings file at {}, using defaults", path);
        let settings = Settings::default();
        settings.validate()?;
        Ok(settings)
    }
}
