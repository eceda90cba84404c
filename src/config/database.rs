//! Database configuration module.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::{
    Account, InventoryBatch, LedgerEntry, LedgerTransaction, Product, PurchaseOrder,
    PurchaseOrderItem, PurchaseReturn, PurchaseReturnItem, StockMovement, Supplier, User,
    Warehouse,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/purchasing.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable,
/// falling back to a local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
#[instrument]
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables if they do not exist yet.
///
/// Referenced tables are created before the tables pointing at them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Supplier).await?;
    create_table(db, &schema, Warehouse).await?;
    create_table(db, &schema, Product).await?;
    create_table(db, &schema, User).await?;
    create_table(db, &schema, PurchaseOrder).await?;
    create_table(db, &schema, PurchaseOrderItem).await?;
    create_table(db, &schema, PurchaseReturn).await?;
    create_table(db, &schema, PurchaseReturnItem).await?;
    create_table(db, &schema, Account).await?;
    create_table(db, &schema, LedgerTransaction).await?;
    create_table(db, &schema, LedgerEntry).await?;
    create_table(db, &schema, InventoryBatch).await?;
    create_table(db, &schema, StockMovement).await?;

    info!("Database tables ensured");
    Ok(())
}
