//! Purchase return business logic - Sending received goods back to a supplier.
//!
//! A return is raised against a fully received purchase order, approved, and
//! then processed: processing takes the stock out of the warehouse, reverses
//! the payable in the ledger and optionally records the supplier's refund.
//! Refunds can also be recorded later with [`process_refund`].

use crate::{
    config::Settings,
    core::{
        amounts::{return_line_total, round_money},
        catalog, inventory,
        inventory::NewMovement,
        ledger::{self, EntryLine, NewLedgerTransaction, PostedTransaction, ReferenceType},
        numbering, purchase_order,
        status::{Lifecycle, ensure_transition},
    },
    entities::{
        AccountType, MovementType, PurchaseOrderStatus, PurchaseReturn, PurchaseReturnItem,
        PurchaseReturnStatus, account, purchase_order_item, purchase_return, purchase_return_item,
    },
    errors::{Error, Result},
};
use chrono::Datelike;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Note appended when a refund is deferred.
const REFUND_LATER_NOTE: &str = "Refund to be processed later";

/// One line of a new or edited return.
#[derive(Debug, Clone, Default)]
pub struct NewReturnItem {
    /// Returned product
    pub product_id: i64,
    /// Original order line, optional
    pub purchase_item_id: Option<i64>,
    /// Quantity sent back
    pub returned_quantity: i32,
    /// Unit price, defaults to the original line's unit price
    pub price: Option<Decimal>,
}

/// Input of [`create_purchase_return`].
#[derive(Debug, Clone, Default)]
pub struct NewPurchaseReturn {
    /// Explicit return number, generated when absent
    pub return_no: Option<String>,
    /// Purchase order the goods came from
    pub purchase_id: i64,
    /// Supplier, defaults to the purchase's supplier
    pub supplier_id: Option<i64>,
    /// Warehouse, defaults to the purchase's warehouse
    pub warehouse_id: Option<i64>,
    /// Return date, now when absent
    pub return_date: Option<DateTimeUtc>,
    /// Why the goods go back
    pub reason: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Returned lines, at least one
    pub items: Vec<NewReturnItem>,
}

/// Changes applied by [`update_purchase_return`].
#[derive(Debug, Clone, Default)]
pub struct PurchaseReturnUpdate {
    /// New return date
    pub return_date: Option<DateTimeUtc>,
    /// New reason
    pub reason: Option<String>,
    /// New notes
    pub notes: Option<String>,
    /// Replacement line set
    pub items: Option<Vec<NewReturnItem>>,
}

/// Refund options of [`process_return`].
#[derive(Debug, Clone, Default)]
pub struct ProcessReturnRequest {
    /// Record the supplier's refund now
    pub refund_to_supplier: bool,
    /// Defer the refund to [`process_refund`]; wins over `refund_to_supplier`
    pub refund_later: bool,
    /// Refunded amount, defaults to the return total
    pub refund_amount: Option<Decimal>,
    /// How the refund was received
    pub refund_method: Option<String>,
    /// External reference of the refund
    pub refund_reference: Option<String>,
    /// Asset account receiving the refund, defaults to the cash account
    pub debit_account_code: Option<String>,
    /// Remarks stored with the refund
    pub notes: Option<String>,
}

/// Input of [`process_refund`].
#[derive(Debug, Clone, Default)]
pub struct RefundRequest {
    /// Refunded amount, defaults to the return total
    pub refund_amount: Option<Decimal>,
    /// How the refund was received
    pub refund_method: Option<String>,
    /// External reference of the refund
    pub refund_reference: Option<String>,
    /// Asset account receiving the refund, defaults to the cash account
    pub debit_account_code: Option<String>,
    /// Remarks stored with the refund
    pub notes: Option<String>,
}

/// What happened to the refund when a return was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundDisposition {
    /// Refund posted immediately
    Immediate {
        /// Refunded amount
        amount: Decimal,
        /// Account that received it
        debit_account_code: String,
    },
    /// Refund left for [`process_refund`]
    Deferred,
    /// No refund expected
    None,
}

/// Result of [`process_return`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReturnSummary {
    /// Human-readable outcome
    pub message: String,
    /// Processed return
    pub return_id: i64,
    /// Its number
    pub return_no: String,
    /// Return total
    pub total: Decimal,
    /// Supplier payable account that was debited
    pub supplier_account_code: String,
    /// Inventory account that was credited
    pub inventory_account_code: String,
    /// Refund outcome
    pub refund: RefundDisposition,
}

/// Result of [`process_refund`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundSummary {
    /// Human-readable outcome
    pub message: String,
    /// Refunded return
    pub return_id: i64,
    /// Refunded amount
    pub amount: Decimal,
    /// Account that received the refund
    pub debit_account_code: String,
    /// Supplier account that was credited
    pub supplier_account_code: String,
    /// Posted ledger transaction
    pub transaction_id: i64,
}

/// A `supplier_refund` ledger transaction seen from the return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    /// Ledger transaction id
    pub transaction_id: i64,
    /// Refunded amount
    pub amount: Decimal,
    /// Refund method
    pub method: Option<String>,
    /// Memo of the transaction
    pub note: Option<String>,
    /// Account that received the money
    pub debit_account_code: Option<String>,
    /// Supplier account that was credited
    pub credit_account_code: Option<String>,
    /// When the refund was posted
    pub created_at: DateTimeUtc,
}

impl From<&PostedTransaction> for RefundRecord {
    fn from(posted: &PostedTransaction) -> Self {
        Self {
            transaction_id: posted.transaction.id,
            amount: posted.amount(),
            method: posted.transaction.payment_method.clone(),
            note: posted.transaction.memo.clone(),
            debit_account_code: posted.debit_account_code().map(str::to_string),
            credit_account_code: posted.credit_account_code().map(str::to_string),
            created_at: posted.transaction.created_at,
        }
    }
}

/// A return with its lines and refund history.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReturnDetails {
    /// Return header
    pub purchase_return: purchase_return::Model,
    /// Lines in insertion order
    pub items: Vec<purchase_return_item::Model>,
    /// Refunds posted for this return, oldest first
    pub refund_history: Vec<RefundRecord>,
}

/// A validated return line ready to insert.
struct ResolvedLine {
    product_id: i64,
    purchase_item_id: Option<i64>,
    returned_quantity: i32,
    price: Decimal,
    line_total: Decimal,
}

fn resolve_lines(
    purchase_id: i64,
    purchase_lines: &[purchase_order_item::Model],
    items: &[NewReturnItem],
) -> Result<Vec<ResolvedLine>> {
    if items.is_empty() {
        return Err(Error::validation("a purchase return needs at least one item"));
    }

    items
        .iter()
        .map(|item| {
            if item.returned_quantity <= 0 {
                return Err(Error::validation(format!(
                    "returned quantity for product {} must be positive, got {}",
                    item.product_id, item.returned_quantity
                )));
            }

            let not_in_purchase = Error::ProductNotInPurchase {
                purchase_id,
                product_id: item.product_id,
            };
            let original = match item.purchase_item_id {
                Some(line_id) => purchase_lines
                    .iter()
                    .find(|l| l.id == line_id && l.product_id == item.product_id),
                None => purchase_lines.iter().find(|l| l.product_id == item.product_id),
            }
            .ok_or(not_in_purchase)?;

            let price = item.price.unwrap_or(original.unit_price);
            if price < Decimal::ZERO {
                return Err(Error::validation(format!(
                    "return price for product {} cannot be negative",
                    item.product_id
                )));
            }

            Ok(ResolvedLine {
                product_id: item.product_id,
                purchase_item_id: item.purchase_item_id,
                returned_quantity: item.returned_quantity,
                price,
                line_total: return_line_total(price, item.returned_quantity),
            })
        })
        .collect()
}

/// Quantity of a product already on approved or processed returns of a purchase.
pub async fn returned_quantity<C>(
    db: &C,
    purchase_id: i64,
    product_id: i64,
    excluding_return: Option<i64>,
) -> Result<i32>
where
    C: ConnectionTrait,
{
    let mut returns = PurchaseReturn::find()
        .filter(purchase_return::Column::PurchaseId.eq(purchase_id))
        .filter(purchase_return::Column::Status.is_in([
            PurchaseReturnStatus::Approved,
            PurchaseReturnStatus::Processed,
        ]));
    if let Some(id) = excluding_return {
        returns = returns.filter(purchase_return::Column::Id.ne(id));
    }
    let return_ids: Vec<i64> = returns.all(db).await?.into_iter().map(|r| r.id).collect();
    if return_ids.is_empty() {
        return Ok(0);
    }

    Ok(PurchaseReturnItem::find()
        .filter(purchase_return_item::Column::PurchaseReturnId.is_in(return_ids))
        .filter(purchase_return_item::Column::ProductId.eq(product_id))
        .all(db)
        .await?
        .iter()
        .map(|i| i.returned_quantity)
        .sum())
}

async fn ensure_returnable<C>(
    db: &C,
    purchase_id: i64,
    purchase_lines: &[purchase_order_item::Model],
    lines: &[ResolvedLine],
    excluding_return: Option<i64>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    // Summed as i64 so huge requests fail the comparison instead of wrapping.
    let mut requested: BTreeMap<i64, i64> = BTreeMap::new();
    for line in lines {
        *requested.entry(line.product_id).or_default() += i64::from(line.returned_quantity);
    }

    for (product_id, requested) in requested {
        let purchased: i64 = purchase_lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| i64::from(l.quantity))
            .sum();
        let already_returned =
            returned_quantity(db, purchase_id, product_id, excluding_return).await?;
        if i64::from(already_returned) + requested > purchased {
            return Err(Error::ReturnQuantityExceeded {
                product_id,
                purchased: i32::try_from(purchased).unwrap_or(i32::MAX),
                already_returned,
                requested: i32::try_from(requested).unwrap_or(i32::MAX),
            });
        }
    }
    Ok(())
}

async fn insert_lines<C>(db: &C, return_id: i64, lines: &[ResolvedLine]) -> Result<()>
where
    C: ConnectionTrait,
{
    for line in lines {
        purchase_return_item::ActiveModel {
            purchase_return_id: Set(return_id),
            product_id: Set(line.product_id),
            purchase_item_id: Set(line.purchase_item_id),
            returned_quantity: Set(line.returned_quantity),
            price: Set(line.price),
            line_total: Set(line.line_total),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

fn total_of(lines: &[ResolvedLine]) -> Decimal {
    round_money(lines.iter().map(|l| l.line_total).sum())
}

fn append_note(existing: Option<String>, note: &str) -> Option<String> {
    match existing {
        Some(text) if !text.trim().is_empty() => Some(format!("{text}\n{note}")),
        _ => Some(note.to_string()),
    }
}

fn invalid_status(purchase_return: &purchase_return::Model, operation: &'static str) -> Error {
    Error::InvalidStatus {
        entity: "PurchaseReturn",
        id: purchase_return.id,
        status: purchase_return.status.label().to_string(),
        operation,
    }
}

/// Loads a return, failing with [`Error::NotFound`].
pub async fn load_return<C>(db: &C, return_id: i64) -> Result<purchase_return::Model>
where
    C: ConnectionTrait,
{
    PurchaseReturn::find_by_id(return_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "PurchaseReturn",
            id: return_id,
        })
}

async fn return_items<C>(db: &C, return_id: i64) -> Result<Vec<purchase_return_item::Model>>
where
    C: ConnectionTrait,
{
    PurchaseReturnItem::find()
        .filter(purchase_return_item::Column::PurchaseReturnId.eq(return_id))
        .order_by_asc(purchase_return_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn load_details<C>(
    db: &C,
    purchase_return: purchase_return::Model,
) -> Result<PurchaseReturnDetails>
where
    C: ConnectionTrait,
{
    let items = return_items(db, purchase_return.id).await?;
    let refund_history =
        ledger::transactions_for_reference(db, ReferenceType::SupplierRefund, purchase_return.id)
            .await?
            .iter()
            .map(RefundRecord::from)
            .collect();
    Ok(PurchaseReturnDetails {
        purchase_return,
        items,
        refund_history,
    })
}

/// Creates a draft return against a fully received purchase.
///
/// Each line must name a product of the purchase, and the quantity must fit in
/// what is still returnable once approved and processed returns are counted.
#[instrument(skip(db, input), fields(purchase_id = input.purchase_id))]
pub async fn create_purchase_return(
    db: &DatabaseConnection,
    input: NewPurchaseReturn,
    acting_user: Option<i64>,
) -> Result<PurchaseReturnDetails> {
    if input.items.is_empty() {
        return Err(Error::validation("a purchase return needs at least one item"));
    }

    let txn = db.begin().await?;
    let created_by = catalog::resolve_actor(&txn, acting_user).await?;

    let explicit_no = match input.return_no.as_deref().map(str::trim) {
        Some("") => return Err(Error::validation("return number cannot be blank")),
        Some(number) => {
            let taken = PurchaseReturn::find()
                .filter(purchase_return::Column::ReturnNo.eq(number))
                .one(&txn)
                .await?
                .is_some();
            if taken {
                return Err(Error::DuplicateNumber {
                    number: number.to_string(),
                });
            }
            Some(number.to_string())
        }
        None => None,
    };

    let purchase = purchase_order::load_order(&txn, input.purchase_id).await?;
    if purchase.status != PurchaseOrderStatus::FullyReceived {
        return Err(Error::PurchaseNotReceived {
            purchase_id: purchase.id,
            status: purchase.status.label().to_string(),
        });
    }
    let supplier =
        catalog::require_supplier(&txn, input.supplier_id.unwrap_or(purchase.supplier_id)).await?;
    let warehouse =
        catalog::require_warehouse(&txn, input.warehouse_id.unwrap_or(purchase.warehouse_id))
            .await?;

    let purchase_lines = purchase_order::order_items(&txn, purchase.id).await?;
    let lines = resolve_lines(purchase.id, &purchase_lines, &input.items)?;
    ensure_returnable(&txn, purchase.id, &purchase_lines, &lines, None).await?;

    let now = chrono::Utc::now();
    let return_no = match explicit_no {
        Some(number) => number,
        None => numbering::next_return_no(&txn, now.year()).await?,
    };

    let purchase_return = purchase_return::ActiveModel {
        return_no: Set(return_no),
        purchase_id: Set(purchase.id),
        supplier_id: Set(supplier.id),
        warehouse_id: Set(warehouse.id),
        return_date: Set(input.return_date.unwrap_or(now)),
        status: Set(PurchaseReturnStatus::Draft),
        total: Set(total_of(&lines)),
        reason: Set(input.reason),
        notes: Set(input.notes),
        refund_to_supplier: Set(false),
        refund_amount: Set(None),
        refund_method: Set(None),
        refund_reference: Set(None),
        debit_account_code: Set(None),
        refunded_at: Set(None),
        approved_at: Set(None),
        approved_by: Set(None),
        approval_notes: Set(None),
        processed_at: Set(None),
        processed_by: Set(None),
        created_by: Set(created_by),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    insert_lines(&txn, purchase_return.id, &lines).await?;
    let details = load_details(&txn, purchase_return).await?;
    txn.commit().await?;

    info!(
        "Created purchase return {} against {} (total {})",
        details.purchase_return.return_no, purchase.order_no, details.purchase_return.total
    );
    Ok(details)
}

/// Retrieves a return with its lines and refund history.
pub async fn get_purchase_return(
    db: &DatabaseConnection,
    return_id: i64,
) -> Result<PurchaseReturnDetails> {
    let purchase_return = load_return(db, return_id).await?;
    load_details(db, purchase_return).await
}

/// Lists returns, newest first, optionally only those of one purchase.
pub async fn list_purchase_returns(
    db: &DatabaseConnection,
    purchase_id: Option<i64>,
) -> Result<Vec<purchase_return::Model>> {
    let mut query = PurchaseReturn::find();
    if let Some(purchase_id) = purchase_id {
        query = query.filter(purchase_return::Column::PurchaseId.eq(purchase_id));
    }
    query
        .order_by_desc(purchase_return::Column::CreatedAt)
        .order_by_desc(purchase_return::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Edits a draft return; supplying `items` replaces every line and the total.
#[instrument(skip(db, update))]
pub async fn update_purchase_return(
    db: &DatabaseConnection,
    return_id: i64,
    update: PurchaseReturnUpdate,
) -> Result<PurchaseReturnDetails> {
    let txn = db.begin().await?;
    let purchase_return = load_return(&txn, return_id).await?;
    if purchase_return.status != PurchaseReturnStatus::Draft {
        return Err(invalid_status(&purchase_return, "only draft can be updated"));
    }

    let mut active: purchase_return::ActiveModel = purchase_return.clone().into();
    if let Some(items) = update.items.as_deref() {
        let purchase_lines =
            purchase_order::order_items(&txn, purchase_return.purchase_id).await?;
        let lines = resolve_lines(purchase_return.purchase_id, &purchase_lines, items)?;
        ensure_returnable(
            &txn,
            purchase_return.purchase_id,
            &purchase_lines,
            &lines,
            Some(purchase_return.id),
        )
        .await?;

        PurchaseReturnItem::delete_many()
            .filter(purchase_return_item::Column::PurchaseReturnId.eq(purchase_return.id))
            .exec(&txn)
            .await?;
        insert_lines(&txn, purchase_return.id, &lines).await?;
        active.total = Set(total_of(&lines));
    }
    if let Some(return_date) = update.return_date {
        active.return_date = Set(return_date);
    }
    if update.reason.is_some() {
        active.reason = Set(update.reason);
    }
    if update.notes.is_some() {
        active.notes = Set(update.notes);
    }
    active.updated_at = Set(chrono::Utc::now());
    let purchase_return = active.update(&txn).await?;

    let details = load_details(&txn, purchase_return).await?;
    txn.commit().await?;
    debug!("Updated purchase return {}", details.purchase_return.return_no);
    Ok(details)
}

/// Approves a draft return.
///
/// Returnable quantities are checked again, since other returns of the same
/// purchase may have been approved since this one was drafted.
#[instrument(skip(db, notes))]
pub async fn approve_return(
    db: &DatabaseConnection,
    return_id: i64,
    notes: Option<String>,
    acting_user: Option<i64>,
) -> Result<purchase_return::Model> {
    let txn = db.begin().await?;
    let approved_by = catalog::resolve_actor(&txn, acting_user).await?;
    let purchase_return = load_return(&txn, return_id).await?;
    ensure_transition(purchase_return.status, PurchaseReturnStatus::Approved)?;

    let purchase_lines = purchase_order::order_items(&txn, purchase_return.purchase_id).await?;
    let lines: Vec<ResolvedLine> = return_items(&txn, purchase_return.id)
        .await?
        .into_iter()
        .map(|i| ResolvedLine {
            product_id: i.product_id,
            purchase_item_id: i.purchase_item_id,
            returned_quantity: i.returned_quantity,
            price: i.price,
            line_total: i.line_total,
        })
        .collect();
    ensure_returnable(
        &txn,
        purchase_return.purchase_id,
        &purchase_lines,
        &lines,
        Some(purchase_return.id),
    )
    .await?;

    let now = chrono::Utc::now();
    let mut active: purchase_return::ActiveModel = purchase_return.into();
    active.status = Set(PurchaseReturnStatus::Approved);
    active.approved_at = Set(Some(now));
    active.approved_by = Set(approved_by);
    active.approval_notes = Set(notes);
    active.updated_at = Set(now);
    let purchase_return = active.update(&txn).await?;
    txn.commit().await?;

    info!("Approved purchase return {}", purchase_return.return_no);
    Ok(purchase_return)
}

/// Refund fields shared by [`process_return`] and [`process_refund`].
struct RefundInput<'a> {
    amount: Option<Decimal>,
    method: Option<&'a str>,
    debit_account_code: Option<&'a str>,
    notes: Option<&'a str>,
}

/// Checks the refund and posts it: debit the receiving asset account, credit the supplier.
async fn post_refund<C>(
    db: &C,
    purchase_return: &purchase_return::Model,
    supplier_account: &account::Model,
    refund: RefundInput<'_>,
    created_by: Option<i64>,
    settings: &Settings,
) -> Result<PostedTransaction>
where
    C: ConnectionTrait,
{
    let amount = round_money(refund.amount.unwrap_or(purchase_return.total));
    if amount <= Decimal::ZERO {
        return Err(Error::validation(format!(
            "refund amount must be positive, got {amount}"
        )));
    }
    if amount > purchase_return.total {
        return Err(Error::RefundExceedsTotal {
            amount,
            total: purchase_return.total,
        });
    }

    let code = refund
        .debit_account_code
        .unwrap_or(settings.ledger.cash_account_code.as_str());
    let debit_account = ledger::require_account(db, code).await?;
    if debit_account.account_type != AccountType::Asset {
        return Err(Error::AccountNotAsset {
            code: debit_account.code,
        });
    }

    ledger::create_transaction(
        db,
        NewLedgerTransaction {
            reference_type: ReferenceType::SupplierRefund,
            reference_id: purchase_return.id,
            payment_method: refund.method.map(str::to_string),
            memo: Some(
                refund.notes.map_or_else(
                    || format!("Refund for {}", purchase_return.return_no),
                    str::to_string,
                ),
            ),
            created_by,
            entries: vec![
                EntryLine::debit(
                    debit_account.code,
                    amount,
                    format!("Refund received for {}", purchase_return.return_no),
                ),
                EntryLine::credit(
                    supplier_account.code.clone(),
                    amount,
                    format!("Supplier refund for {}", purchase_return.return_no),
                ),
            ],
        },
    )
    .await
}

async fn require_supplier_account<C>(db: &C, supplier_id: i64) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    ledger::find_supplier_account(db, supplier_id)
        .await?
        .ok_or(Error::SupplierAccountMissing { supplier_id })
}

/// Ships an approved return back to the supplier.
///
/// Deducts every line from the warehouse batch, posts the reversing
/// `purchase_return` entry (debit supplier payable, credit Inventory) and
/// handles the refund as requested. Any failure rolls everything back.
#[instrument(skip(db, request, settings))]
pub async fn process_return(
    db: &DatabaseConnection,
    return_id: i64,
    request: ProcessReturnRequest,
    acting_user: Option<i64>,
    settings: &Settings,
) -> Result<ProcessReturnSummary> {
    let txn = db.begin().await?;
    let processed_by = catalog::resolve_actor(&txn, acting_user).await?;
    let purchase_return = load_return(&txn, return_id).await?;
    ensure_transition(purchase_return.status, PurchaseReturnStatus::Processed)?;

    let supplier_account = require_supplier_account(&txn, purchase_return.supplier_id).await?;
    let inventory_account = ledger::ensure_inventory_account(&txn, &settings.ledger).await?;

    for item in return_items(&txn, purchase_return.id).await? {
        inventory::deduct_from_batch(
            &txn,
            item.product_id,
            purchase_return.warehouse_id,
            item.returned_quantity,
        )
        .await?;
        inventory::record_movement(
            &txn,
            NewMovement {
                product_id: item.product_id,
                warehouse_id: purchase_return.warehouse_id,
                quantity: item.returned_quantity,
                movement_type: MovementType::Out,
                note: format!("Returned to supplier on {}", purchase_return.return_no),
                created_by: processed_by,
            },
        )
        .await?;
    }

    let now = chrono::Utc::now();
    let mut active: purchase_return::ActiveModel = purchase_return.clone().into();
    let refund = if request.refund_later {
        active.refund_to_supplier = Set(false);
        active.notes = Set(append_note(purchase_return.notes.clone(), REFUND_LATER_NOTE));
        RefundDisposition::Deferred
    } else if request.refund_to_supplier {
        let posted = post_refund(
            &txn,
            &purchase_return,
            &supplier_account,
            RefundInput {
                amount: request.refund_amount,
                method: request.refund_method.as_deref(),
                debit_account_code: request.debit_account_code.as_deref(),
                notes: request.notes.as_deref(),
            },
            processed_by,
            settings,
        )
        .await?;
        let amount = posted.amount();
        let debit_account_code = posted.debit_account_code().unwrap_or_default().to_string();
        active.refund_to_supplier = Set(true);
        active.refund_amount = Set(Some(amount));
        active.refund_method = Set(request.refund_method.clone());
        active.refund_reference = Set(request.refund_reference.clone());
        active.debit_account_code = Set(Some(debit_account_code.clone()));
        active.refunded_at = Set(Some(now));
        if let Some(notes) = request.notes.as_deref() {
            active.notes = Set(append_note(purchase_return.notes.clone(), notes));
        }
        RefundDisposition::Immediate {
            amount,
            debit_account_code,
        }
    } else {
        active.refund_to_supplier = Set(false);
        RefundDisposition::None
    };

    if purchase_return.total > Decimal::ZERO {
        ledger::create_transaction(
            &txn,
            NewLedgerTransaction {
                reference_type: ReferenceType::PurchaseReturn,
                reference_id: purchase_return.id,
                payment_method: None,
                memo: Some(format!("Goods returned on {}", purchase_return.return_no)),
                created_by: processed_by,
                entries: vec![
                    EntryLine::debit(
                        supplier_account.code.clone(),
                        purchase_return.total,
                        format!("Payable reduced by {}", purchase_return.return_no),
                    ),
                    EntryLine::credit(
                        inventory_account.code.clone(),
                        purchase_return.total,
                        format!("Inventory returned on {}", purchase_return.return_no),
                    ),
                ],
            },
        )
        .await?;
    } else {
        warn!(
            "Purchase return {} has a zero total, no reversing entry posted",
            purchase_return.return_no
        );
    }

    active.status = Set(PurchaseReturnStatus::Processed);
    active.processed_at = Set(Some(now));
    active.processed_by = Set(processed_by);
    active.updated_at = Set(now);
    let purchase_return = active.update(&txn).await?;
    txn.commit().await?;

    let message = match &refund {
        RefundDisposition::Immediate { amount, .. } => {
            format!("Return processed, refund of {amount} recorded")
        }
        RefundDisposition::Deferred => "Return processed, refund to be processed later".to_string(),
        RefundDisposition::None => "Return processed".to_string(),
    };
    info!("Purchase return {}: {}", purchase_return.return_no, message);

    Ok(ProcessReturnSummary {
        message,
        return_id: purchase_return.id,
        return_no: purchase_return.return_no,
        total: purchase_return.total,
        supplier_account_code: supplier_account.code,
        inventory_account_code: inventory_account.code,
        refund,
    })
}

/// Cancels a draft or approved return.
#[instrument(skip(db))]
pub async fn cancel_return(
    db: &DatabaseConnection,
    return_id: i64,
) -> Result<purchase_return::Model> {
    let purchase_return = load_return(db, return_id).await?;
    ensure_transition(purchase_return.status, PurchaseReturnStatus::Cancelled)?;

    let mut active: purchase_return::ActiveModel = purchase_return.into();
    active.status = Set(PurchaseReturnStatus::Cancelled);
    active.updated_at = Set(chrono::Utc::now());
    let purchase_return = active.update(db).await?;

    info!("Cancelled purchase return {}", purchase_return.return_no);
    Ok(purchase_return)
}

/// Records the supplier's refund for a processed return that has none yet.
#[instrument(skip(db, request, settings))]
pub async fn process_refund(
    db: &DatabaseConnection,
    return_id: i64,
    request: RefundRequest,
    acting_user: Option<i64>,
    settings: &Settings,
) -> Result<RefundSummary> {
    let txn = db.begin().await?;
    let created_by = catalog::resolve_actor(&txn, acting_user).await?;
    let purchase_return = load_return(&txn, return_id).await?;
    if purchase_return.status != PurchaseReturnStatus::Processed {
        return Err(invalid_status(
            &purchase_return,
            "only processed returns can be refunded",
        ));
    }
    if purchase_return.refund_to_supplier {
        return Err(Error::AlreadyRefunded {
            id: purchase_return.id,
        });
    }

    let supplier_account = require_supplier_account(&txn, purchase_return.supplier_id).await?;
    let posted = post_refund(
        &txn,
        &purchase_return,
        &supplier_account,
        RefundInput {
            amount: request.refund_amount,
            method: request.refund_method.as_deref(),
            debit_account_code: request.debit_account_code.as_deref(),
            notes: request.notes.as_deref(),
        },
        created_by,
        settings,
    )
    .await?;

    let amount = posted.amount();
    let debit_account_code = posted.debit_account_code().unwrap_or_default().to_string();
    let now = chrono::Utc::now();
    let notes = match request.notes.as_deref() {
        Some(notes) => append_note(purchase_return.notes.clone(), notes),
        None => purchase_return.notes.clone(),
    };
    let mut active: purchase_return::ActiveModel = purchase_return.into();
    active.refund_to_supplier = Set(true);
    active.refund_amount = Set(Some(amount));
    active.refund_method = Set(request.refund_method);
    active.refund_reference = Set(request.refund_reference);
    active.debit_account_code = Set(Some(debit_account_code.clone()));
    active.refunded_at = Set(Some(now));
    active.notes = Set(notes);
    active.updated_at = Set(now);
    let purchase_return = active.update(&txn).await?;
    txn.commit().await?;

    info!(
        "Recorded refund of {} for purchase return {}",
        amount, purchase_return.return_no
    );
    Ok(RefundSummary {
        message: format!("Refund of {amount} recorded"),
        return_id: purchase_return.id,
        amount,
        debit_account_code,
        supplier_account_code: supplier_account.code,
        transaction_id: posted.transaction.id,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::inventory::{movements_for, quantity_on_hand},
        test_utils::*,
    };
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_return_requires_fully_received_purchase() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let order = create_approved_order(&fixture, 10, dec!(100)).await?;

        let result = create_purchase_return(
            &fixture.db,
            return_input(order.order.id, fixture.product.id, 2),
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::PurchaseNotReceived { .. })));
        assert!(list_purchase_returns(&fixture.db, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_prices_lines_from_purchase() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let order = create_received_purchase(&fixture, 10, dec!(12.5)).await?;

        let details = create_purchase_return(
            &fixture.db,
            return_input(order.order.id, fixture.product.id, 4),
            Some(fixture.user.id),
        )
        .await?;

        let purchase_return = &details.purchase_return;
        assert_eq!(purchase_return.status, PurchaseReturnStatus::Draft);
        assert_eq!(purchase_return.total, dec!(50));
        assert!(purchase_return.return_no.starts_with("PR-"));
        assert!(purchase_return.return_no.ends_with("-001"));
        assert_eq!(purchase_return.supplier_id, fixture.supplier.id);
        assert_eq!(details.items[0].price, dec!(12.5));
        assert!(details.refund_history.is_empty());

        let duplicate = NewPurchaseReturn {
            return_no: Some(purchase_return.return_no.clone()),
            ..return_input(order.order.id, fixture.product.id, 1)
        };
        assert!(matches!(
            create_purchase_return(&fixture.db, duplicate, None).await,
            Err(Error::DuplicateNumber { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_products_and_lines() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;
        let other = catalog::create_product(&fixture.db, "Bolt", "BOLT-1").await?;

        let result = create_purchase_return(
            &fixture.db,
            return_input(order.order.id, other.id, 1),
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::ProductNotInPurchase { .. })));

        let mut wrong_line = return_input(order.order.id, fixture.product.id, 1);
        wrong_line.items[0].purchase_item_id = Some(order.items[0].id + 100);
        let result = create_purchase_return(&fixture.db, wrong_line, None).await;
        assert!(matches!(result, Err(Error::ProductNotInPurchase { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_returnable_quantity_counts_approved_returns() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;

        let first =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 7), None)
                .await?;
        approve_return(db, first.purchase_return.id, None, None).await?;

        let result =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 4), None)
                .await;
        assert!(matches!(
            result,
            Err(Error::ReturnQuantityExceeded {
                purchased: 10,
                already_returned: 7,
                requested: 4,
                ..
            })
        ));

        // drafts are not counted, so a second draft can exist until approval
        let second =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 3), None)
                .await?;
        let third =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 3), None)
                .await?;
        approve_return(db, second.purchase_return.id, None, None).await?;
        assert!(matches!(
            approve_return(db, third.purchase_return.id, None, None).await,
            Err(Error::ReturnQuantityExceeded { .. })
        ));

        // a cancelled return frees its quantity
        cancel_return(db, second.purchase_return.id).await?;
        let approved = approve_return(
            db,
            third.purchase_return.id,
            Some("checked".to_string()),
            Some(fixture.user.id),
        )
        .await?;
        assert_eq!(approved.status, PurchaseReturnStatus::Approved);
        assert_eq!(approved.approved_by, Some(fixture.user.id));
        assert_eq!(approved.approval_notes.as_deref(), Some("checked"));
        assert_eq!(returned_quantity(db, order.order.id, fixture.product.id, None).await?, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_huge_return_quantities_are_rejected() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;

        let first =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 5), None)
                .await?;
        approve_return(db, first.purchase_return.id, None, None).await?;

        let huge = create_purchase_return(
            db,
            return_input(order.order.id, fixture.product.id, i32::MAX),
            None,
        )
        .await;
        assert!(matches!(
            huge,
            Err(Error::ReturnQuantityExceeded {
                purchased: 10,
                already_returned: 5,
                requested: i32::MAX,
                ..
            })
        ));

        // two lines of the same product whose sum does not fit in an i32
        let mut split = return_input(order.order.id, fixture.product.id, i32::MAX);
        split.items.push(split.items[0].clone());
        let split = create_purchase_return(db, split, None).await;
        assert!(matches!(
            split,
            Err(Error::ReturnQuantityExceeded { requested: i32::MAX, .. })
        ));
        assert_eq!(returned_quantity(db, order.order.id, fixture.product.id, None).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_only_in_draft() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 2), None)
                .await?;
        let id = created.purchase_return.id;

        let updated = update_purchase_return(
            db,
            id,
            PurchaseReturnUpdate {
                reason: Some("damaged".to_string()),
                items: Some(vec![NewReturnItem {
                    product_id: fixture.product.id,
                    returned_quantity: 5,
                    price: Some(dec!(8)),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.items.len(), 1);
        assert_eq!(updated.purchase_return.total, dec!(40));
        assert_eq!(updated.purchase_return.reason.as_deref(), Some("damaged"));

        approve_return(db, id, None, None).await?;
        let refused = update_purchase_return(db, id, PurchaseReturnUpdate::default()).await;
        assert!(matches!(refused, Err(Error::InvalidStatus { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_process_with_immediate_refund() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(100)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 3), None)
                .await?;
        let id = created.purchase_return.id;
        approve_return(db, id, None, None).await?;

        let summary = process_return(
            db,
            id,
            ProcessReturnRequest {
                refund_to_supplier: true,
                refund_amount: Some(dec!(300)),
                refund_method: Some("bank_transfer".to_string()),
                refund_reference: Some("TRX-77".to_string()),
                ..Default::default()
            },
            Some(fixture.user.id),
            &fixture.settings,
        )
        .await?;
        assert_eq!(summary.total, dec!(300));
        assert_eq!(summary.inventory_account_code, "1300");
        assert_eq!(
            summary.refund,
            RefundDisposition::Immediate {
                amount: dec!(300),
                debit_account_code: "1000".to_string(),
            }
        );

        let details = get_purchase_return(db, id).await?;
        let processed = &details.purchase_return;
        assert_eq!(processed.status, PurchaseReturnStatus::Processed);
        assert!(processed.refund_to_supplier);
        assert_eq!(processed.refund_amount, Some(dec!(300)));
        assert_eq!(processed.processed_by, Some(fixture.user.id));
        assert!(processed.refunded_at.is_some());

        assert_eq!(details.refund_history.len(), 1);
        let record = &details.refund_history[0];
        assert_eq!(record.amount, dec!(300));
        assert_eq!(record.method.as_deref(), Some("bank_transfer"));
        assert_eq!(record.debit_account_code.as_deref(), Some("1000"));
        assert_eq!(
            record.credit_account_code.as_deref(),
            Some(summary.supplier_account_code.as_str())
        );

        let reversal =
            ledger::transactions_for_reference(db, ReferenceType::PurchaseReturn, id).await?;
        assert_eq!(reversal.len(), 1);
        assert_eq!(reversal[0].amount(), dec!(300));
        assert_eq!(
            reversal[0].debit_account_code(),
            Some(summary.supplier_account_code.as_str())
        );

        assert_eq!(
            quantity_on_hand(db, fixture.product.id, fixture.warehouse.id).await?,
            7
        );
        let movements = movements_for(db, fixture.product.id, fixture.warehouse.id).await?;
        let out = movements.last().unwrap();
        assert_eq!(out.movement_type, MovementType::Out);
        assert_eq!(out.quantity, 3);
        assert!(out.note.contains(&processed.return_no));

        // payable: +1000 on receipt, -300 on return, +300 on refund
        let payable = ledger::require_account(db, &summary.supplier_account_code).await?;
        assert_eq!(payable.balance, dec!(1000));
        Ok(())
    }

    #[tokio::test]
    async fn test_process_rolls_back_on_insufficient_stock() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(100)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 5), None)
                .await?;
        let id = created.purchase_return.id;
        approve_return(db, id, None, None).await?;

        // stock left the warehouse through some other channel
        inventory::deduct_from_batch(db, fixture.product.id, fixture.warehouse.id, 8).await?;

        let result = process_return(
            db,
            id,
            ProcessReturnRequest {
                refund_to_supplier: true,
                ..Default::default()
            },
            None,
            &fixture.settings,
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::InsufficientInventory { available: 2, required: 5, .. })
        ));

        let after = get_purchase_return(db, id).await?;
        assert_eq!(after.purchase_return.status, PurchaseReturnStatus::Approved);
        assert!(after.refund_history.is_empty());
        assert!(
            ledger::transactions_for_reference(db, ReferenceType::PurchaseReturn, id)
                .await?
                .is_empty()
        );
        assert_eq!(
            quantity_on_hand(db, fixture.product.id, fixture.warehouse.id).await?,
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_refund_validation_rolls_back_processing() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 2), None)
                .await?;
        let id = created.purchase_return.id;
        approve_return(db, id, None, None).await?;

        let too_much = process_return(
            db,
            id,
            ProcessReturnRequest {
                refund_to_supplier: true,
                refund_amount: Some(dec!(25)),
                ..Default::default()
            },
            None,
            &fixture.settings,
        )
        .await;
        assert!(matches!(too_much, Err(Error::RefundExceedsTotal { .. })));

        let payable_account = process_return(
            db,
            id,
            ProcessReturnRequest {
                refund_to_supplier: true,
                debit_account_code: Some(format!("2100-{}", fixture.supplier.id)),
                ..Default::default()
            },
            None,
            &fixture.settings,
        )
        .await;
        assert!(matches!(payable_account, Err(Error::AccountNotAsset { .. })));

        assert_eq!(
            quantity_on_hand(db, fixture.product.id, fixture.warehouse.id).await?,
            10
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_deferred_refund_then_process_refund() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 4), None)
                .await?;
        let id = created.purchase_return.id;

        assert!(matches!(
            process_refund(db, id, RefundRequest::default(), None, &fixture.settings).await,
            Err(Error::InvalidStatus { .. })
        ));

        approve_return(db, id, None, None).await?;
        let summary = process_return(
            db,
            id,
            ProcessReturnRequest {
                refund_to_supplier: true,
                refund_later: true,
                ..Default::default()
            },
            None,
            &fixture.settings,
        )
        .await?;
        assert_eq!(summary.refund, RefundDisposition::Deferred);

        let deferred = get_purchase_return(db, id).await?;
        assert!(!deferred.purchase_return.refund_to_supplier);
        assert!(
            deferred
                .purchase_return
                .notes
                .as_deref()
                .unwrap()
                .contains(REFUND_LATER_NOTE)
        );
        assert!(deferred.refund_history.is_empty());

        let refund = process_refund(
            db,
            id,
            RefundRequest {
                refund_amount: Some(dec!(30)),
                refund_method: Some("cash".to_string()),
                notes: Some("partial credit".to_string()),
                ..Default::default()
            },
            Some(fixture.user.id),
            &fixture.settings,
        )
        .await?;
        assert_eq!(refund.amount, dec!(30));
        assert_eq!(refund.debit_account_code, "1000");

        let refunded = get_purchase_return(db, id).await?;
        assert!(refunded.purchase_return.refund_to_supplier);
        assert_eq!(refunded.refund_history.len(), 1);
        assert_eq!(refunded.refund_history[0].note.as_deref(), Some("partial credit"));
        assert!(
            refunded
                .purchase_return
                .notes
                .as_deref()
                .unwrap()
                .contains("partial credit")
        );

        assert!(matches!(
            process_refund(db, id, RefundRequest::default(), None, &fixture.settings).await,
            Err(Error::AlreadyRefunded { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_refund_and_terminal_processed() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 1), None)
                .await?;
        let id = created.purchase_return.id;

        assert!(matches!(
            process_return(db, id, ProcessReturnRequest::default(), None, &fixture.settings).await,
            Err(Error::InvalidTransition { .. })
        ));

        approve_return(db, id, None, None).await?;
        let summary =
            process_return(db, id, ProcessReturnRequest::default(), None, &fixture.settings)
                .await?;
        assert_eq!(summary.refund, RefundDisposition::None);
        assert!(
            ledger::transactions_for_reference(db, ReferenceType::SupplierRefund, id)
                .await?
                .is_empty()
        );

        assert!(matches!(
            cancel_return(db, id).await,
            Err(Error::InvalidTransition { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_process_requires_supplier_account() -> Result<()> {
        let fixture = setup_purchasing().await?;
        let db = &fixture.db;
        let order = create_received_purchase(&fixture, 10, dec!(10)).await?;
        let created =
            create_purchase_return(db, return_input(order.order.id, fixture.product.id, 1), None)
                .await?;
        let id = created.purchase_return.id;
        approve_return(db, id, None, None).await?;

        // a return that names a supplier the ledger has never seen
        let other = catalog::create_supplier(db, "Other Supplies", None).await?;
        let mut active: purchase_return::ActiveModel = load_return(db, id).await?.into();
        active.supplier_id = Set(other.id);
        active.update(db).await?;

        let result =
            process_return(db, id, ProcessReturnRequest::default(), None, &fixture.settings).await;
        assert!(matches!(result, Err(Error::SupplierAccountMissing { .. })));
        Ok(())
    }
}
