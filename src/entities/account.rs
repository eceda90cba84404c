//! Account entity - A ledger account in the chart of accounts.
//!
//! Supplier payable accounts carry the supplier's id so they can be looked up
//! without knowing the generated code.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Classification of a ledger account
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Resources owned, debit-normal
    #[sea_orm(string_value = "asset")]
    Asset,
    /// Obligations, credit-normal
    #[sea_orm(string_value = "liability")]
    Liability,
    /// Owner's equity, credit-normal
    #[sea_orm(string_value = "equity")]
    Equity,
    /// Revenue, credit-normal
    #[sea_orm(string_value = "income")]
    Income,
    /// Costs, debit-normal
    #[sea_orm(string_value = "expense")]
    Expense,
}

impl AccountType {
    /// Whether a debit increases the balance of this account type.
    #[must_use]
    pub const fn is_debit_normal(self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }
}

/// Account database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Account code, unique across the chart
    #[sea_orm(unique)]
    pub code: String,
    /// Display name
    pub name: String,
    /// Account classification
    pub account_type: AccountType,
    /// Set for supplier payable accounts
    pub supplier_id: Option<i64>,
    /// Running balance in the account's normal direction
    pub balance: Decimal,
    /// When the account was opened
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Account and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many entries
    #[sea_orm(has_many = "super::ledger_entry::Entity")]
    Entries,
}

impl Related<super::ledger_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
