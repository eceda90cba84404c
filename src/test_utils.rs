//! Shared test utilities for the purchasing core.
//!
//! This module provides helpers for setting up in-memory test databases and
//! walking orders through their lifecycle with sensible defaults.

use crate::{
    config::Settings,
    core::{
        catalog, ledger,
        purchase_order::{
            self, NewOrderItem, NewPurchaseOrder, PurchaseOrderDetails, ReceivedItem,
        },
        purchase_return::{NewPurchaseReturn, NewReturnItem},
    },
    entities::{PurchaseOrderStatus, inventory_batch, product, supplier, user, warehouse},
    errors::Result,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Installs a test-writer tracing subscriber once per test binary.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A seeded database with one of each referenced entity.
pub struct Fixture {
    /// Connection to the in-memory database
    pub db: DatabaseConnection,
    /// Supplier "Acme Parts"
    pub supplier: supplier::Model,
    /// Warehouse "MAIN"
    pub warehouse: warehouse::Model,
    /// Product "Widget"
    pub product: product::Model,
    /// User "clerk"
    pub user: user::Model,
    /// Default settings
    pub settings: Settings,
}

/// Sets up a database with a supplier, warehouse, product, user and the base ledger accounts.
pub async fn setup_purchasing() -> Result<Fixture> {
    let db = setup_test_db().await?;
    let settings = Settings::default();
    let supplier =
        catalog::create_supplier(&db, "Acme Parts", Some("orders@acme.test".to_string())).await?;
    let warehouse = catalog::create_warehouse(&db, "Main warehouse", "MAIN").await?;
    let product = catalog::create_product(&db, "Widget", "WID-001").await?;
    let user = catalog::create_user(&db, "clerk").await?;
    ledger::ensure_base_accounts(&db, &settings.ledger).await?;

    Ok(Fixture {
        db,
        supplier,
        warehouse,
        product,
        user,
        settings,
    })
}

/// Order input with one line of 10 fixture products at 100, no tax or discount.
pub fn order_input(fixture: &Fixture) -> NewPurchaseOrder {
    NewPurchaseOrder {
        supplier_id: fixture.supplier.id,
        warehouse_id: fixture.warehouse.id,
        items: vec![NewOrderItem {
            product_id: fixture.product.id,
            quantity: 10,
            unit_price: Decimal::ONE_HUNDRED,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Creates a draft order with one line of `quantity` fixture products at `unit_price`.
pub async fn create_test_order(
    fixture: &Fixture,
    quantity: i32,
    unit_price: Decimal,
) -> Result<PurchaseOrderDetails> {
    let mut input = order_input(fixture);
    input.items[0].quantity = quantity;
    input.items[0].unit_price = unit_price;
    purchase_order::create_purchase_order(&fixture.db, input, None, &fixture.settings).await
}

/// Creates a draft order with an explicit order number.
pub async fn create_order_with_number(
    fixture: &Fixture,
    order_no: &str,
) -> Result<PurchaseOrderDetails> {
    let input = NewPurchaseOrder {
        order_no: Some(order_no.to_string()),
        ..order_input(fixture)
    };
    purchase_order::create_purchase_order(&fixture.db, input, None, &fixture.settings).await
}

/// Moves a draft order through `Sent` to `Approved`.
pub async fn approve_order(fixture: &Fixture, order_id: i64) -> Result<()> {
    for status in [PurchaseOrderStatus::Sent, PurchaseOrderStatus::Approved] {
        purchase_order::update_purchase_order_status(&fixture.db, order_id, status, None).await?;
    }
    Ok(())
}

/// Creates an approved order ready to receive.
pub async fn create_approved_order(
    fixture: &Fixture,
    quantity: i32,
    unit_price: Decimal,
) -> Result<PurchaseOrderDetails> {
    let order = create_test_order(fixture, quantity, unit_price).await?;
    approve_order(fixture, order.order.id).await?;
    purchase_order::get_purchase_order(&fixture.db, order.order.id).await
}

/// Creates an order and receives every line in full.
pub async fn create_received_purchase(
    fixture: &Fixture,
    quantity: i32,
    unit_price: Decimal,
) -> Result<PurchaseOrderDetails> {
    let order = create_approved_order(fixture, quantity, unit_price).await?;
    let items: Vec<ReceivedItem> = order
        .items
        .iter()
        .map(|i| ReceivedItem {
            item_id: i.id,
            quantity: i.quantity,
        })
        .collect();
    purchase_order::receive_items(&fixture.db, order.order.id, &items, None, &fixture.settings)
        .await
}

/// Return input for `quantity` of one product, priced from the purchase.
pub fn return_input(purchase_id: i64, product_id: i64, quantity: i32) -> NewPurchaseReturn {
    NewPurchaseReturn {
        purchase_id,
        reason: Some("damaged in transit".to_string()),
        items: vec![NewReturnItem {
            product_id,
            returned_quantity: quantity,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Inserts a batch directly, bypassing receipts.
pub async fn insert_test_batch(
    db: &DatabaseConnection,
    product_id: i64,
    warehouse_id: i64,
    batch_no: &str,
    quantity: i32,
) -> Result<inventory_batch::Model> {
    let now = chrono::Utc::now();
    let batch = inventory_batch::ActiveModel {
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        batch_no: Set(batch_no.to_string()),
        quantity: Set(quantity),
        purchase_price: Set(Decimal::ONE),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(batch.insert(db).await?)
}
