//! Stock movement entity - Append-only audit log of quantity changes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a stock movement
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Stock entering the warehouse
    #[sea_orm(string_value = "IN")]
    In,
    /// Stock leaving the warehouse
    #[sea_orm(string_value = "OUT")]
    Out,
}

/// Stock movement database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    /// Unique identifier for the movement
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Moved product
    pub product_id: i64,
    /// Warehouse the movement happened in
    pub warehouse_id: i64,
    /// Moved quantity, always positive
    pub quantity: i32,
    /// Direction
    pub movement_type: MovementType,
    /// What caused the movement, e.g. `"Received from PO-2026-001"`
    pub note: String,
    /// User who caused the movement
    pub created_by: Option<i64>,
    /// When the movement was recorded
    pub created_at: DateTimeUtc,
}

/// `StockMovement` rows stand alone
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
