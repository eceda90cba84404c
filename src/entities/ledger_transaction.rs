//! Ledger transaction entity - A balanced set of entries posted for one business event.
//!
//! `reference_type` and `reference_id` tie the transaction back to the document
//! that caused it, e.g. `purchase_receive` / order id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Kind of document that caused the posting
    pub reference_type: String,
    /// Id of that document
    pub reference_id: i64,
    /// Settlement method for cash movements (e.g. `"bank_transfer"`)
    pub payment_method: Option<String>,
    /// Free-text memo
    pub memo: Option<String>,
    /// User who posted the transaction
    pub created_by: Option<i64>,
    /// When the transaction was posted
    pub created_at: DateTimeUtc,
}

/// Defines relationships between LedgerTransaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One transaction has many entries
    #[sea_orm(has_many = "super::ledger_entry::Entity")]
    Entries,
}

impl Related<super::ledger_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
