//! Purchase order entity - An order placed with a supplier for delivery into a warehouse.
//!
//! Monetary columns hold 2-decimal values and satisfy
//! `total_amount = subtotal + tax_amount - discount_amount` and
//! `due_amount = total_amount - paid_amount`. Lines live in
//! [`super::purchase_order_item`].

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a purchase order
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    /// Being prepared, still editable
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Sent to the supplier
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Confirmed, goods may be received
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Declined, may be reworked as a draft
    #[sea_orm(string_value = "rejected")]
    Rejected,
    /// Some lines are still outstanding
    #[sea_orm(string_value = "partial_received")]
    PartialReceived,
    /// Every line received in full
    #[sea_orm(string_value = "fully_received")]
    FullyReceived,
    /// Abandoned
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Settled and archived
    #[sea_orm(string_value = "closed")]
    Closed,
}

/// Purchase order database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable number, `PO-<year>-<seq>`
    #[sea_orm(unique)]
    pub order_no: String,
    /// Supplier the order is placed with
    pub supplier_id: i64,
    /// Warehouse the goods are delivered to
    pub warehouse_id: i64,
    /// User who created the order
    pub created_by: Option<i64>,
    /// Current lifecycle status
    pub status: PurchaseOrderStatus,
    /// Date the order was placed
    pub order_date: DateTimeUtc,
    /// Date delivery is expected
    pub expected_date: Option<Date>,
    /// Stamped when the order enters `Sent`
    pub sent_date: Option<DateTimeUtc>,
    /// Stamped when the order enters `Approved`
    pub approved_date: Option<DateTimeUtc>,
    /// Stamped on every receipt
    pub received_date: Option<DateTimeUtc>,
    /// Sum of line taxable amounts
    pub subtotal: Decimal,
    /// Order tax
    pub tax_amount: Decimal,
    /// Order-level discount
    pub discount_amount: Decimal,
    /// `subtotal + tax_amount - discount_amount`
    pub total_amount: Decimal,
    /// Amount already paid to the supplier
    pub paid_amount: Decimal,
    /// `total_amount - paid_amount`
    pub due_amount: Decimal,
    /// Free-text notes
    pub notes: Option<String>,
    /// Free-form bag, holds status change reasons
    pub metadata: Option<Json>,
    /// Soft delete flag
    pub is_active: bool,
    /// When the order was created
    pub created_at: DateTimeUtc,
    /// When the order was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between PurchaseOrder and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each order belongs to one supplier
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::Id"
    )]
    Supplier,
    /// Each order is delivered to one warehouse
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
    /// One order has many lines
    #[sea_orm(has_many = "super::purchase_order_item::Entity")]
    Items,
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl Related<super::purchase_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
