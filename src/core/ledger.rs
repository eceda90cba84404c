//! Double-entry ledger used by the purchasing services.
//!
//! A posting is a [`NewLedgerTransaction`]: a reference to the document that
//! caused it plus at least two one-sided entries whose debits equal their
//! credits. Posting also moves the running balance of every touched account.

use crate::{
    config::LedgerSettings,
    entities::{
        Account, AccountType, LedgerEntry, LedgerTransaction, account, ledger_entry,
        ledger_transaction,
    },
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// What kind of document a ledger transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    /// Goods received against a purchase order
    PurchaseReceive,
    /// Settlement of an order's prepaid amount on receipt
    PurchasePayment,
    /// Goods returned to a supplier
    PurchaseReturn,
    /// Money refunded by a supplier for a return
    SupplierRefund,
}

impl ReferenceType {
    /// Stored tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseReceive => "purchase_receive",
            Self::PurchasePayment => "purchase_payment",
            Self::PurchaseReturn => "purchase_return",
            Self::SupplierRefund => "supplier_refund",
        }
    }
}

/// One line of a posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLine {
    /// Code of the account to post to
    pub account_code: String,
    /// Debit amount
    pub debit: Decimal,
    /// Credit amount
    pub credit: Decimal,
    /// Line description
    pub narration: String,
}

impl EntryLine {
    /// A debit line.
    pub fn debit(
        account_code: impl Into<String>,
        amount: Decimal,
        narration: impl Into<String>,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Decimal::ZERO,
            narration: narration.into(),
        }
    }

    /// A credit line.
    pub fn credit(
        account_code: impl Into<String>,
        amount: Decimal,
        narration: impl Into<String>,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Decimal::ZERO,
            credit: amount,
            narration: narration.into(),
        }
    }
}

/// A posting request.
#[derive(Debug, Clone)]
pub struct NewLedgerTransaction {
    /// Kind of originating document
    pub reference_type: ReferenceType,
    /// Id of the originating document
    pub reference_id: i64,
    /// Settlement method, for cash movements
    pub payment_method: Option<String>,
    /// Free-text memo
    pub memo: Option<String>,
    /// User posting the transaction
    pub created_by: Option<i64>,
    /// Entry lines
    pub entries: Vec<EntryLine>,
}

/// A persisted transaction with its entries.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedTransaction {
    /// Transaction header
    pub transaction: ledger_transaction::Model,
    /// Entry lines in insertion order
    pub entries: Vec<ledger_entry::Model>,
}

impl PostedTransaction {
    /// Sum of debits, which equals the sum of credits.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.entries.iter().map(|e| e.debit).sum()
    }

    /// Code of the first debited account.
    #[must_use]
    pub fn debit_account_code(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.debit > Decimal::ZERO)
            .map(|e| e.account_code.as_str())
    }

    /// Code of the first credited account.
    #[must_use]
    pub fn credit_account_code(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.credit > Decimal::ZERO)
            .map(|e| e.account_code.as_str())
    }
}

/// Checks entry shape and balance, returning the transaction amount.
pub fn validate_entries(entries: &[EntryLine]) -> Result<Decimal> {
    if entries.len() < 2 {
        return Err(Error::validation("a ledger transaction needs at least two entries"));
    }

    let mut debit = Decimal::ZERO;
    let mut credit = Decimal::ZERO;
    for entry in entries {
        if entry.debit < Decimal::ZERO || entry.credit < Decimal::ZERO {
            return Err(Error::validation(format!(
                "entry for account {} has a negative amount",
                entry.account_code
            )));
        }
        let one_sided = entry.debit.is_zero() != entry.credit.is_zero();
        if !one_sided {
            return Err(Error::validation(format!(
                "entry for account {} must be either a debit or a credit",
                entry.account_code
            )));
        }
        debit += entry.debit;
        credit += entry.credit;
    }

    if debit != credit {
        return Err(Error::UnbalancedTransaction { debit, credit });
    }
    Ok(debit)
}

/// Posts a balanced transaction and updates the balances of the touched accounts.
///
/// Run this inside the caller's database transaction so a later failure undoes the posting.
pub async fn create_transaction<C>(db: &C, new: NewLedgerTransaction) -> Result<PostedTransaction>
where
    C: ConnectionTrait,
{
    let amount = validate_entries(&new.entries)?;

    let mut accounts: HashMap<String, account::Model> = HashMap::new();
    for entry in &new.entries {
        if !accounts.contains_key(&entry.account_code) {
            let account = require_account(db, &entry.account_code).await?;
            accounts.insert(entry.account_code.clone(), account);
        }
    }

    let transaction = ledger_transaction::ActiveModel {
        reference_type: Set(new.reference_type.as_str().to_string()),
        reference_id: Set(new.reference_id),
        payment_method: Set(new.payment_method),
        memo: Set(new.memo),
        created_by: Set(new.created_by),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    // net movement per account, in the account's normal direction
    let mut movements: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut entries = Vec::with_capacity(new.entries.len());
    for line in new.entries {
        let account = &accounts[&line.account_code];
        let delta = if account.account_type.is_debit_normal() {
            line.debit - line.credit
        } else {
            line.credit - line.debit
        };
        *movements.entry(line.account_code.clone()).or_default() += delta;

        let entry = ledger_entry::ActiveModel {
            transaction_id: Set(transaction.id),
            account_id: Set(account.id),
            account_code: Set(line.account_code),
            debit: Set(line.debit),
            credit: Set(line.credit),
            narration: Set(line.narration),
            ..Default::default()
        }
        .insert(db)
        .await?;
        entries.push(entry);
    }

    for (code, delta) in movements {
        if let Some(account) = accounts.remove(&code) {
            let balance = account.balance + delta;
            let mut active: account::ActiveModel = account.into();
            active.balance = Set(balance);
            active.update(db).await?;
        }
    }

    info!(
        reference_type = new.reference_type.as_str(),
        reference_id = new.reference_id,
        %amount,
        "Posted ledger transaction {}",
        transaction.id
    );
    Ok(PostedTransaction {
        transaction,
        entries,
    })
}

/// Looks an account up by code.
pub async fn find_account_by_code<C>(db: &C, code: &str) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find()
        .filter(account::Column::Code.eq(code))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Looks an account up by code, failing with [`Error::AccountNotFound`].
pub async fn require_account<C>(db: &C, code: &str) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    find_account_by_code(db, code)
        .await?
        .ok_or_else(|| Error::AccountNotFound {
            code: code.to_string(),
        })
}

/// Payable account of a supplier, if one was opened.
pub async fn find_supplier_account<C>(db: &C, supplier_id: i64) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find()
        .filter(account::Column::SupplierId.eq(supplier_id))
        .order_by_asc(account::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Payable account of a supplier, opened on first use as `<prefix>-<supplier_id>`.
pub async fn get_or_create_supplier_account<C>(
    db: &C,
    supplier_id: i64,
    display_name: &str,
    settings: &LedgerSettings,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    if let Some(account) = find_supplier_account(db, supplier_id).await? {
        return Ok(account);
    }

    let code = format!("{}-{supplier_id}", settings.payable_account_prefix);
    debug!("Opening payable account {} for supplier {}", code, supplier_id);
    let account = account::ActiveModel {
        code: Set(code),
        name: Set(format!("Accounts Payable - {display_name}")),
        account_type: Set(AccountType::Liability),
        supplier_id: Set(Some(supplier_id)),
        balance: Set(Decimal::ZERO),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(account.insert(db).await?)
}

/// Returns the account with `code`, creating it with `name` and `account_type` if missing.
pub async fn ensure_account<C>(
    db: &C,
    code: &str,
    name: &str,
    account_type: AccountType,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    if let Some(account) = find_account_by_code(db, code).await? {
        return Ok(account);
    }

    info!("Creating {} account {} ({:?})", name, code, account_type);
    let account = account::ActiveModel {
        code: Set(code.to_string()),
        name: Set(name.to_string()),
        account_type: Set(account_type),
        supplier_id: Set(None),
        balance: Set(Decimal::ZERO),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(account.insert(db).await?)
}

/// The Inventory asset account named in the settings, created if missing.
pub async fn ensure_inventory_account<C>(
    db: &C,
    settings: &LedgerSettings,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    ensure_account(
        db,
        &settings.inventory_account_code,
        &settings.inventory_account_name,
        AccountType::Asset,
    )
    .await
}

/// Creates the Inventory and cash accounts the services rely on.
pub async fn ensure_base_accounts<C>(
    db: &C,
    settings: &LedgerSettings,
) -> Result<(account::Model, account::Model)>
where
    C: ConnectionTrait,
{
    let inventory = ensure_inventory_account(db, settings).await?;
    let cash = ensure_account(
        db,
        &settings.cash_account_code,
        &settings.cash_account_name,
        AccountType::Asset,
    )
    .await?;
    Ok((inventory, cash))
}

/// All transactions posted for a document, oldest first.
pub async fn transactions_for_reference<C>(
    db: &C,
    reference_type: ReferenceType,
    reference_id: i64,
) -> Result<Vec<PostedTransaction>>
where
    C: ConnectionTrait,
{
    let transactions = LedgerTransaction::find()
        .filter(ledger_transaction::Column::ReferenceType.eq(reference_type.as_str()))
        .filter(ledger_transaction::Column::ReferenceId.eq(reference_id))
        .order_by_asc(ledger_transaction::Column::Id)
        .all(db)
        .await?;

    let mut posted = Vec::with_capacity(transactions.len());
    for transaction in transactions {
        let entries = LedgerEntry::find()
            .filter(ledger_entry::Column::TransactionId.eq(transaction.id))
            .order_by_asc(ledger_entry::Column::Id)
            .all(db)
            .await?;
        posted.push(PostedTransaction {
            transaction,
            entries,
        });
    }
    Ok(posted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    fn posting(entries: Vec<EntryLine>) -> NewLedgerTransaction {
        NewLedgerTransaction {
            reference_type: ReferenceType::PurchaseReceive,
            reference_id: 1,
            payment_method: None,
            memo: None,
            created_by: None,
            entries,
        }
    }

    #[test]
    fn test_validate_entries() {
        let balanced = [
            EntryLine::debit("1300", dec!(50), "stock"),
            EntryLine::credit("2100-1", dec!(50), "payable"),
        ];
        assert_eq!(validate_entries(&balanced).unwrap(), dec!(50));

        let unbalanced = [
            EntryLine::debit("1300", dec!(50), "stock"),
            EntryLine::credit("2100-1", dec!(40), "payable"),
        ];
        assert!(matches!(
            validate_entries(&unbalanced),
            Err(Error::UnbalancedTransaction { .. })
        ));

        let single = [EntryLine::debit("1300", dec!(50), "stock")];
        assert!(matches!(validate_entries(&single), Err(Error::Validation { .. })));

        let two_sided = [
            EntryLine {
                account_code: "1300".to_string(),
                debit: dec!(5),
                credit: dec!(5),
                narration: String::new(),
            },
            EntryLine::credit("2100-1", dec!(0), "payable"),
        ];
        assert!(matches!(validate_entries(&two_sided), Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_create_transaction_moves_balances() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let payable = get_or_create_supplier_account(
            db,
            fixture.supplier.id,
            &fixture.supplier.name,
            &fixture.settings.ledger,
        )
        .await?;

        let posted = create_transaction(
            db,
            posting(vec![
                EntryLine::debit("1300", dec!(120.50), "Goods received"),
                EntryLine::credit(payable.code.clone(), dec!(120.50), "Owed to supplier"),
            ]),
        )
        .await?;

        assert_eq!(posted.amount(), dec!(120.50));
        assert_eq!(posted.debit_account_code(), Some("1300"));
        assert_eq!(posted.credit_account_code(), Some(payable.code.as_str()));
        assert_eq!(posted.transaction.reference_type, "purchase_receive");

        let inventory = require_account(db, "1300").await?;
        assert_eq!(inventory.balance, dec!(120.50));
        let payable = require_account(db, &payable.code).await?;
        assert_eq!(payable.balance, dec!(120.50));

        let found = transactions_for_reference(db, ReferenceType::PurchaseReceive, 1).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], posted);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_account_is_rejected() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let result = create_transaction(
            &fixture.db,
            posting(vec![
                EntryLine::debit("1300", dec!(10), "stock"),
                EntryLine::credit("9999", dec!(10), "nowhere"),
            ]),
        )
        .await;
        assert!(matches!(result, Err(Error::AccountNotFound { code }) if code == "9999"));
        Ok(())
    }

    #[tokio::test]
    async fn test_supplier_account_is_created_once() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        assert!(find_supplier_account(db, fixture.supplier.id).await?.is_none());

        let ledger_settings = &fixture.settings.ledger;
        let first =
            get_or_create_supplier_account(db, fixture.supplier.id, "Acme", ledger_settings)
                .await?;
        let second =
            get_or_create_supplier_account(db, fixture.supplier.id, "Acme", ledger_settings)
                .await?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.code, format!("2100-{}", fixture.supplier.id));
        assert_eq!(first.account_type, AccountType::Liability);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_base_accounts_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = LedgerSettings::default();
        let (inventory, cash) = ensure_base_accounts(&db, &settings).await?;
        let (inventory_again, cash_again) = ensure_base_accounts(&db, &settings).await?;
        assert_eq!(inventory.id, inventory_again.id);
        assert_eq!(cash.id, cash_again.id);
        assert_eq!(inventory.name, "Inventory");
        assert_eq!(cash.account_type, AccountType::Asset);
        Ok(())
    }
}
