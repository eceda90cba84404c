//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod inventory_batch;
pub mod ledger_entry;
pub mod ledger_transaction;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod purchase_return;
pub mod purchase_return_item;
pub mod stock_movement;
pub mod supplier;
pub mod user;
pub mod warehouse;

// Re-export specific types to avoid conflicts
pub use account::{AccountType, Entity as Account, Model as AccountModel};
pub use inventory_batch::{Entity as InventoryBatch, Model as InventoryBatchModel};
pub use ledger_entry::{Entity as LedgerEntry, Model as LedgerEntryModel};
pub use ledger_transaction::{Entity as LedgerTransaction, Model as LedgerTransactionModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use purchase_order::{Entity as PurchaseOrder, Model as PurchaseOrderModel, PurchaseOrderStatus};
pub use purchase_order_item::{Entity as PurchaseOrderItem, Model as PurchaseOrderItemModel};
pub use purchase_return::{
    Entity as PurchaseReturn, Model as PurchaseReturnModel, PurchaseReturnStatus,
};
pub use purchase_return_item::{Entity as PurchaseReturnItem, Model as PurchaseReturnItemModel};
pub use stock_movement::{Entity as StockMovement, Model as StockMovementModel, MovementType};
pub use supplier::{Entity as Supplier, Model as SupplierModel};
pub use user::{Entity as User, Model as UserModel};
pub use warehouse::{Entity as Warehouse, Model as WarehouseModel};
