//! Unified error type for the purchasing core.
//!
//! Every failure a service operation can report is a variant here. Callers that
//! need an HTTP-ish classification use [`Error::kind`].

use rust_decimal::Decimal;
use sea_orm::DbErr;
use thiserror::Error;

/// Coarse classification of an [`Error`], suitable for mapping onto a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist
    NotFound,
    /// The request is well-formed but violates a business rule
    BadRequest,
    /// Storage or configuration failure
    Internal,
}

/// All errors produced by the purchasing core.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced row does not exist (or is inactive)
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name, e.g. `"Supplier"`
        entity: &'static str,
        /// Requested id
        id: i64,
    },

    /// A ledger account code does not resolve to an account
    #[error("Account with code {code} not found")]
    AccountNotFound {
        /// The account code that was looked up
        code: String,
    },

    /// A status change that the lifecycle table does not allow
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// An operation attempted while the document is in the wrong status
    #[error("{entity} {id} is {status}; {operation}")]
    InvalidStatus {
        /// Entity name
        entity: &'static str,
        /// Document id
        id: i64,
        /// Current status
        status: String,
        /// What was refused, e.g. `"only draft can be updated"`
        operation: &'static str,
    },

    /// Receiving more than what is still outstanding on an order line
    #[error(
        "Cannot receive {requested} of product {product_id}: {received} of {ordered} already received"
    )]
    QuantityExceeded {
        /// Product on the order line
        product_id: i64,
        /// Quantity ordered on the line
        ordered: i32,
        /// Quantity received so far
        received: i32,
        /// Quantity in this request
        requested: i32,
    },

    /// Returning more than what is still returnable for a product
    #[error(
        "Cannot return {requested} of product {product_id}: purchased {purchased}, already returned {already_returned}"
    )]
    ReturnQuantityExceeded {
        /// Product being returned
        product_id: i64,
        /// Quantity originally purchased
        purchased: i32,
        /// Quantity on approved or processed returns
        already_returned: i32,
        /// Quantity in this request
        requested: i32,
    },

    /// Stock on hand is lower than what a return needs to ship back
    #[error(
        "Insufficient inventory for product {product_id} in warehouse {warehouse_id}: available {available}, required {required}"
    )]
    InsufficientInventory {
        /// Product
        product_id: i64,
        /// Warehouse
        warehouse_id: i64,
        /// Quantity on hand
        available: i32,
        /// Quantity required
        required: i32,
    },

    /// Refund amount above the return total
    #[error("Refund amount {amount} exceeds return total {total}")]
    RefundExceedsTotal {
        /// Requested refund
        amount: Decimal,
        /// Return total
        total: Decimal,
    },

    /// Refund requested for a return that was already refunded
    #[error("Purchase return {id} has already been refunded")]
    AlreadyRefunded {
        /// Return id
        id: i64,
    },

    /// An explicit document number that is already taken
    #[error("Document number {number} already exists")]
    DuplicateNumber {
        /// The duplicate number
        number: String,
    },

    /// Refund debit account that is not an asset account
    #[error("Account {code} must be an asset account")]
    AccountNotAsset {
        /// Offending account code
        code: String,
    },

    /// Supplier without a payable account in the ledger
    #[error("Supplier {supplier_id} has no ledger account")]
    SupplierAccountMissing {
        /// Supplier id
        supplier_id: i64,
    },

    /// Return raised against a purchase that is not fully received
    #[error(
        "Cannot return from purchase {purchase_id}: status is {status}, expected fully_received"
    )]
    PurchaseNotReceived {
        /// Purchase id
        purchase_id: i64,
        /// Current purchase status
        status: String,
    },

    /// Return line for a product the purchase never contained
    #[error("Product {product_id} is not part of purchase {purchase_id}")]
    ProductNotInPurchase {
        /// Purchase id
        purchase_id: i64,
        /// Product id
        product_id: i64,
    },

    /// Ledger entries whose debits and credits differ
    #[error("Unbalanced transaction: debit {debit} != credit {credit}")]
    UnbalancedTransaction {
        /// Total debit
        debit: Decimal,
        /// Total credit
        credit: Decimal,
    },

    /// Malformed input
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Storage error
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Classifies the error for the caller.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::AccountNotFound { .. } => ErrorKind::NotFound,
            Self::Config { .. } | Self::Database(_) => ErrorKind::Internal,
            _ => ErrorKind::BadRequest,
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_kinds() {
        let not_found = Error::NotFound {
            entity: "Supplier",
            id: 7,
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.to_string(), "Supplier 7 not found");

        let refund = Error::RefundExceedsTotal {
            amount: dec!(120),
            total: dec!(100),
        };
        assert_eq!(refund.kind(), ErrorKind::BadRequest);

        let db = Error::Database(DbErr::Custom("boom".to_string()));
        assert_eq!(db.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_quantity_message_names_product() {
        let err = Error::QuantityExceeded {
            product_id: 3,
            ordered: 10,
            received: 8,
            requested: 5,
        };
        let message = err.to_string();
        assert!(message.contains("product 3"));
        assert!(message.contains("8 of 10"));
    }
}
