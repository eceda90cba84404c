//! Inventory batch entity - A lot of on-hand stock for one (product, warehouse) pair.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Inventory batch database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_batches")]
pub struct Model {
    /// Unique identifier for the batch
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Stocked product
    pub product_id: i64,
    /// Warehouse holding the stock
    pub warehouse_id: i64,
    /// `BATCH-<product>-<warehouse>-<YYMMDD>-<seq>`
    #[sea_orm(unique)]
    pub batch_no: String,
    /// Quantity on hand
    pub quantity: i32,
    /// Unit price of the latest receipt into this batch
    pub purchase_price: Decimal,
    /// When the batch was opened
    pub created_at: DateTimeUtc,
    /// When the batch was last changed
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
