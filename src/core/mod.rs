//! Core business logic - Framework-agnostic purchasing operations.
//!
//! Every operation takes a database connection (or an open transaction) and
//! explicit inputs; nothing here reads global state.

/// Line and order total computation
pub mod amounts;
/// Supplier, warehouse, product and user lookups
pub mod catalog;
/// Inventory batches and stock movements
pub mod inventory;
/// Double-entry ledger postings
pub mod ledger;
/// Order, return and batch numbering
pub mod numbering;
/// Purchase order lifecycle and receipts
pub mod purchase_order;
/// Purchase return lifecycle and refunds
pub mod purchase_return;
/// Allowed status transitions
pub mod status;
