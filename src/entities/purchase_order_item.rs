//! Purchase order item entity - One ordered line.
//!
//! Lines are owned by their order and are deleted and recreated wholesale
//! whenever the order's items are edited. `quantity_received` stays within
//! `0..=quantity`.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Purchase order item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_order_items")]
pub struct Model {
    /// Unique identifier for the line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order
    pub purchase_order_id: i64,
    /// Ordered product
    pub product_id: i64,
    /// Quantity ordered
    pub quantity: i32,
    /// Quantity received so far
    pub quantity_received: i32,
    /// Price per unit before discount and tax
    pub unit_price: Decimal,
    /// Discount per unit
    pub discount_per_unit: Decimal,
    /// Tax rate in percent (0-100)
    pub tax_rate: Decimal,
    /// Line total after discount and tax
    pub total_price: Decimal,
}

/// Defines relationships between PurchaseOrderItem and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one order
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_order::Column::Id",
        on_delete = "Cascade"
    )]
    PurchaseOrder,
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
