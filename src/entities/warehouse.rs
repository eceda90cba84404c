//! Warehouse entity - A stock location goods are received into and returned from.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Warehouse database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouses")]
pub struct Model {
    /// Unique identifier for the warehouse
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable name
    pub name: String,
    /// Short code, unique across warehouses
    #[sea_orm(unique)]
    pub code: String,
    /// Soft delete flag
    pub is_active: bool,
}

/// `Warehouse` is only referenced, it owns nothing
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
