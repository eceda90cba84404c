//! Inventory batches and the stock movement log.
//!
//! Stock is tracked as one batch per (product, warehouse) pair. Receipts top the
//! batch up, returns draw it down, and every change appends a [`StockMovement`] row.

use crate::{
    core::numbering,
    entities::{InventoryBatch, MovementType, StockMovement, inventory_batch, stock_movement},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::debug;

/// A movement to append to the log.
#[derive(Debug, Clone)]
pub struct NewMovement {
    /// Moved product
    pub product_id: i64,
    /// Warehouse the movement happened in
    pub warehouse_id: i64,
    /// Moved quantity, positive
    pub quantity: i32,
    /// Direction
    pub movement_type: MovementType,
    /// What caused the movement
    pub note: String,
    /// User who caused the movement
    pub created_by: Option<i64>,
}

/// The batch holding stock of `product_id` in `warehouse_id`, if any.
pub async fn find_batch<C>(
    db: &C,
    product_id: i64,
    warehouse_id: i64,
) -> Result<Option<inventory_batch::Model>>
where
    C: ConnectionTrait,
{
    InventoryBatch::find()
        .filter(inventory_batch::Column::ProductId.eq(product_id))
        .filter(inventory_batch::Column::WarehouseId.eq(warehouse_id))
        .order_by_asc(inventory_batch::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Quantity on hand for a (product, warehouse) pair.
pub async fn quantity_on_hand<C>(db: &C, product_id: i64, warehouse_id: i64) -> Result<i32>
where
    C: ConnectionTrait,
{
    Ok(find_batch(db, product_id, warehouse_id)
        .await?
        .map_or(0, |batch| batch.quantity))
}

/// Adds received stock to the (product, warehouse) batch.
///
/// An existing batch is incremented and takes `unit_price` as its purchase
/// price. Otherwise a new batch is opened, numbered for `received_on`.
pub async fn receive_into_batch<C>(
    db: &C,
    product_id: i64,
    warehouse_id: i64,
    quantity: i32,
    unit_price: Decimal,
    received_on: Date,
) -> Result<inventory_batch::Model>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Err(Error::validation(format!(
            "received quantity must be positive, got {quantity}"
        )));
    }

    let now = chrono::Utc::now();
    if let Some(batch) = find_batch(db, product_id, warehouse_id).await? {
        InventoryBatch::update_many()
            .col_expr(
                inventory_batch::Column::Quantity,
                Expr::col(inventory_batch::Column::Quantity).add(quantity),
            )
            .col_expr(inventory_batch::Column::PurchasePrice, Expr::value(unit_price))
            .col_expr(inventory_batch::Column::UpdatedAt, Expr::value(now))
            .filter(inventory_batch::Column::Id.eq(batch.id))
            .exec(db)
            .await?;

        debug!("Added {} to batch {}", quantity, batch.batch_no);
        return InventoryBatch::find_by_id(batch.id)
            .one(db)
            .await?
            .ok_or(Error::NotFound {
                entity: "InventoryBatch",
                id: batch.id,
            });
    }

    let batch_no = numbering::next_batch_no(db, product_id, warehouse_id, received_on).await?;
    debug!("Opening batch {} with {}", batch_no, quantity);
    let batch = inventory_batch::ActiveModel {
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        batch_no: Set(batch_no),
        quantity: Set(quantity),
        purchase_price: Set(unit_price),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(batch.insert(db).await?)
}

/// Removes `quantity` from the (product, warehouse) batch.
///
/// Fails with [`Error::InsufficientInventory`] when no batch exists or it holds
/// less than `quantity`.
pub async fn deduct_from_batch<C>(
    db: &C,
    product_id: i64,
    warehouse_id: i64,
    quantity: i32,
) -> Result<inventory_batch::Model>
where
    C: ConnectionTrait,
{
    let batch = find_batch(db, product_id, warehouse_id).await?;
    let available = batch.as_ref().map_or(0, |b| b.quantity);
    let batch = match batch {
        Some(batch) if batch.quantity >= quantity => batch,
        _ => {
            return Err(Error::InsufficientInventory {
                product_id,
                warehouse_id,
                available,
                required: quantity,
            });
        }
    };

    let remaining = batch.quantity - quantity;
    let mut active: inventory_batch::ActiveModel = batch.into();
    active.quantity = Set(remaining);
    active.updated_at = Set(chrono::Utc::now());
    Ok(active.update(db).await?)
}

/// Appends a movement to the stock log.
pub async fn record_movement<C>(db: &C, movement: NewMovement) -> Result<stock_movement::Model>
where
    C: ConnectionTrait,
{
    if movement.quantity <= 0 {
        return Err(Error::validation("movement quantity must be positive"));
    }

    let row = stock_movement::ActiveModel {
        product_id: Set(movement.product_id),
        warehouse_id: Set(movement.warehouse_id),
        quantity: Set(movement.quantity),
        movement_type: Set(movement.movement_type),
        note: Set(movement.note),
        created_by: Set(movement.created_by),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Movements of a product in a warehouse, oldest first.
pub async fn movements_for<C>(
    db: &C,
    product_id: i64,
    warehouse_id: i64,
) -> Result<Vec<stock_movement::Model>>
where
    C: ConnectionTrait,
{
    StockMovement::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_receive_opens_then_tops_up_batch() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let (product, warehouse) = (fixture.product.id, fixture.warehouse.id);
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();

        let opened = receive_into_batch(db, product, warehouse, 10, dec!(4.5), date).await?;
        assert_eq!(opened.quantity, 10);
        assert_eq!(
            opened.batch_no,
            format!("BATCH-{product}-{warehouse}-260504-001")
        );

        let topped = receive_into_batch(db, product, warehouse, 5, dec!(5.25), date).await?;
        assert_eq!(topped.id, opened.id);
        assert_eq!(topped.quantity, 15);
        assert_eq!(topped.purchase_price, dec!(5.25));
        assert_eq!(quantity_on_hand(db, product, warehouse).await?, 15);
        Ok(())
    }

    #[tokio::test]
    async fn test_deduct_checks_available_quantity() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let (product, warehouse) = (fixture.product.id, fixture.warehouse.id);

        let missing = deduct_from_batch(db, product, warehouse, 1).await;
        assert!(matches!(
            missing,
            Err(Error::InsufficientInventory { available: 0, required: 1, .. })
        ));

        insert_test_batch(db, product, warehouse, "BATCH-T-001", 4).await?;
        let short = deduct_from_batch(db, product, warehouse, 5).await;
        assert!(matches!(
            short,
            Err(Error::InsufficientInventory { available: 4, required: 5, .. })
        ));

        let batch = deduct_from_batch(db, product, warehouse, 4).await?;
        assert_eq!(batch.quantity, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_movements_are_logged_in_order() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let (product, warehouse) = (fixture.product.id, fixture.warehouse.id);

        for (quantity, movement_type) in [(3, MovementType::In), (1, MovementType::Out)] {
            record_movement(
                db,
                NewMovement {
                    product_id: product,
                    warehouse_id: warehouse,
                    quantity,
                    movement_type,
                    note: "manual".to_string(),
                    created_by: None,
                },
            )
            .await?;
        }

        let movements = movements_for(db, product, warehouse).await?;
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].movement_type, MovementType::In);
        assert_eq!(movements[1].quantity, 1);

        let zero = record_movement(
            db,
            NewMovement {
                product_id: product,
                warehouse_id: warehouse,
                quantity: 0,
                movement_type: MovementType::In,
                note: String::new(),
                created_by: None,
            },
        )
        .await;
        assert!(zero.is_err());
        Ok(())
    }
}
