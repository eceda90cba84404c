//! Purchase return entity - Goods sent back to a supplier against a fully received order.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a purchase return
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseReturnStatus {
    /// Being prepared, still editable
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Approved, waiting to ship
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Stock shipped back and ledger reversed
    #[sea_orm(string_value = "processed")]
    Processed,
    /// Abandoned
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Purchase return database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_returns")]
pub struct Model {
    /// Unique identifier for the return
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable number, `PR-<year>-<seq>`
    #[sea_orm(unique)]
    pub return_no: String,
    /// Originating purchase order
    pub purchase_id: i64,
    /// Supplier the goods go back to
    pub supplier_id: i64,
    /// Warehouse the goods leave from
    pub warehouse_id: i64,
    /// Date of the return
    pub return_date: DateTimeUtc,
    /// Current lifecycle status
    pub status: PurchaseReturnStatus,
    /// Sum of line totals
    pub total: Decimal,
    /// Why the goods are returned
    pub reason: Option<String>,
    /// Free-text notes, refund remarks are appended here
    pub notes: Option<String>,
    /// Whether the supplier refunded the return
    pub refund_to_supplier: bool,
    /// Refunded amount
    pub refund_amount: Option<Decimal>,
    /// How the refund was received
    pub refund_method: Option<String>,
    /// External reference of the refund
    pub refund_reference: Option<String>,
    /// Account that received the refund
    pub debit_account_code: Option<String>,
    /// When the refund was recorded
    pub refunded_at: Option<DateTimeUtc>,
    /// When the return was approved
    pub approved_at: Option<DateTimeUtc>,
    /// Who approved the return
    pub approved_by: Option<i64>,
    /// Remarks given on approval
    pub approval_notes: Option<String>,
    /// When the return was processed
    pub processed_at: Option<DateTimeUtc>,
    /// Who processed the return
    pub processed_by: Option<i64>,
    /// Who created the return
    pub created_by: Option<i64>,
    /// When the return was created
    pub created_at: DateTimeUtc,
    /// When the return was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between PurchaseReturn and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each return is raised against one purchase order
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseId",
        to = "super::purchase_order::Column::Id"
    )]
    PurchaseOrder,
    /// One return has many lines
    #[sea_orm(has_many = "super::purchase_return_item::Entity")]
    Items,
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl Related<super::purchase_return_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
