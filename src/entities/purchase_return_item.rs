//! Purchase return item entity - One returned line.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Purchase return item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_return_items")]
pub struct Model {
    /// Unique identifier for the line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning return
    pub purchase_return_id: i64,
    /// Returned product
    pub product_id: i64,
    /// Original order line, when known
    pub purchase_item_id: Option<i64>,
    /// Quantity sent back
    pub returned_quantity: i32,
    /// Original unit price
    pub price: Decimal,
    /// `price * returned_quantity`
    pub line_total: Decimal,
}

/// Defines relationships between PurchaseReturnItem and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one return
    #[sea_orm(
        belongs_to = "super::purchase_return::Entity",
        from = "Column::PurchaseReturnId",
        to = "super::purchase_return::Column::Id",
        on_delete = "Cascade"
    )]
    PurchaseReturn,
}

impl Related<super::purchase_return::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseReturn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
