//! Purchase order business logic - Creating, editing and receiving orders.
//!
//! Orders start in `Draft` and move through the lifecycle in
//! [`crate::core::status`]. Receiving goods is the one operation with side
//! effects outside the order: it tops up inventory batches, appends IN stock
//! movements and posts the receipt (and any prepaid settlement) to the ledger,
//! all inside a single database transaction.

use crate::{
    config::Settings,
    core::{
        amounts::{LineAmounts, LinePricing, OrderTotals, proportional_payment, round_money},
        catalog, inventory,
        inventory::NewMovement,
        ledger::{self, EntryLine, NewLedgerTransaction, ReferenceType},
        numbering,
        status::{Lifecycle, ensure_transition},
    },
    entities::{
        MovementType, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, Supplier, Warehouse,
        purchase_order, purchase_order_item, supplier, warehouse,
    },
    errors::{Error, Result},
};
use chrono::Datelike;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument};

/// One line of a new or edited order.
#[derive(Debug, Clone, Default)]
pub struct NewOrderItem {
    /// Ordered product
    pub product_id: i64,
    /// Quantity ordered
    pub quantity: i32,
    /// Price per unit
    pub unit_price: Decimal,
    /// Discount per unit
    pub discount_per_unit: Decimal,
    /// Tax rate in percent
    pub tax_rate: Decimal,
}

impl NewOrderItem {
    const fn pricing(&self) -> LinePricing {
        LinePricing {
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_per_unit: self.discount_per_unit,
            tax_rate: self.tax_rate,
        }
    }
}

/// Input of [`create_purchase_order`].
#[derive(Debug, Clone, Default)]
pub struct NewPurchaseOrder {
    /// Explicit order number, generated when absent
    pub order_no: Option<String>,
    /// Supplier to order from
    pub supplier_id: i64,
    /// Warehouse to deliver to
    pub warehouse_id: i64,
    /// Order date, now when absent
    pub order_date: Option<DateTimeUtc>,
    /// Expected delivery date
    pub expected_date: Option<Date>,
    /// Explicit order tax, see `PurchasingSettings::honor_tax_override`
    pub tax_amount: Option<Decimal>,
    /// Order-level discount
    pub discount_amount: Decimal,
    /// Amount prepaid to the supplier
    pub paid_amount: Decimal,
    /// Free-text notes
    pub notes: Option<String>,
    /// Order lines, at least one
    pub items: Vec<NewOrderItem>,
}

/// Changes applied by [`update_purchase_order`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderUpdate {
    /// New supplier
    pub supplier_id: Option<i64>,
    /// New warehouse
    pub warehouse_id: Option<i64>,
    /// New expected delivery date
    pub expected_date: Option<Date>,
    /// New explicit order tax
    pub tax_amount: Option<Decimal>,
    /// New order-level discount
    pub discount_amount: Option<Decimal>,
    /// New prepaid amount
    pub paid_amount: Option<Decimal>,
    /// New notes
    pub notes: Option<String>,
    /// Replacement line set
    pub items: Option<Vec<NewOrderItem>>,
}

/// A quantity received against one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedItem {
    /// Order line id
    pub item_id: i64,
    /// Quantity received now
    pub quantity: i32,
}

/// Filters of [`list_purchase_orders`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PurchaseOrderFilter {
    /// Only orders in this status
    pub status: Option<PurchaseOrderStatus>,
    /// Only orders placed with this supplier
    pub supplier_id: Option<i64>,
}

/// An order with its lines and resolved associations.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOrderDetails {
    /// Order header
    pub order: purchase_order::Model,
    /// Lines in insertion order
    pub items: Vec<purchase_order_item::Model>,
    /// Supplier the order is placed with
    pub supplier: supplier::Model,
    /// Warehouse the goods go to
    pub warehouse: warehouse::Model,
}

impl PurchaseOrderDetails {
    /// Whether every line has been received in full.
    #[must_use]
    pub fn is_fully_received(&self) -> bool {
        self.items.iter().all(|i| i.quantity_received == i.quantity)
    }
}

fn price_items(items: &[NewOrderItem]) -> Result<Vec<LineAmounts>> {
    if items.is_empty() {
        return Err(Error::validation("a purchase order needs at least one item"));
    }
    items
        .iter()
        .map(|item| {
            let pricing = item.pricing();
            pricing.validate()?;
            Ok(pricing.amounts())
        })
        .collect()
}

async fn require_products<C>(db: &C, items: &[NewOrderItem]) -> Result<()>
where
    C: ConnectionTrait,
{
    for item in items {
        catalog::require_product(db, item.product_id).await?;
    }
    Ok(())
}

async fn insert_items<C>(
    db: &C,
    order_id: i64,
    items: &[NewOrderItem],
    amounts: &[LineAmounts],
) -> Result<()>
where
    C: ConnectionTrait,
{
    for (item, line) in items.iter().zip(amounts) {
        purchase_order_item::ActiveModel {
            purchase_order_id: Set(order_id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            quantity_received: Set(0),
            unit_price: Set(item.unit_price),
            discount_per_unit: Set(item.discount_per_unit),
            tax_rate: Set(item.tax_rate),
            total_price: Set(line.total),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

fn draft_only(order: &purchase_order::Model, operation: &'static str) -> Result<()> {
    if order.status == PurchaseOrderStatus::Draft {
        Ok(())
    } else {
        Err(Error::InvalidStatus {
            entity: "PurchaseOrder",
            id: order.id,
            status: order.status.label().to_string(),
            operation,
        })
    }
}

/// Loads an active order, failing with [`Error::NotFound`].
pub async fn load_order<C>(db: &C, order_id: i64) -> Result<purchase_order::Model>
where
    C: ConnectionTrait,
{
    PurchaseOrder::find_by_id(order_id)
        .one(db)
        .await?
        .filter(|o| o.is_active)
        .ok_or(Error::NotFound {
            entity: "PurchaseOrder",
            id: order_id,
        })
}

/// Lines of an order in insertion order.
pub async fn order_items<C>(db: &C, order_id: i64) -> Result<Vec<purchase_order_item::Model>>
where
    C: ConnectionTrait,
{
    PurchaseOrderItem::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(order_id))
        .order_by_asc(purchase_order_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn load_details<C>(db: &C, order: purchase_order::Model) -> Result<PurchaseOrderDetails>
where
    C: ConnectionTrait,
{
    let items = order_items(db, order.id).await?;
    let supplier = Supplier::find_by_id(order.supplier_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Supplier",
            id: order.supplier_id,
        })?;
    let warehouse = Warehouse::find_by_id(order.warehouse_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Warehouse",
            id: order.warehouse_id,
        })?;
    Ok(PurchaseOrderDetails {
        order,
        items,
        supplier,
        warehouse,
    })
}

/// Creates a draft purchase order with its lines.
///
/// Totals are computed from the lines; an explicit `tax_amount` replaces the
/// summed line tax when `honor_tax_override` is set. A missing order number is
/// generated as the next `PO-<year>-<seq>`.
#[instrument(skip(db, input, settings), fields(supplier_id = input.supplier_id))]
pub async fn create_purchase_order(
    db: &DatabaseConnection,
    input: NewPurchaseOrder,
    acting_user: Option<i64>,
    settings: &Settings,
) -> Result<PurchaseOrderDetails> {
    let amounts = price_items(&input.items)?;
    let totals = OrderTotals::from_lines(
        &amounts,
        input.tax_amount,
        settings.purchasing.honor_tax_override,
        input.discount_amount,
        input.paid_amount,
    )?;

    let txn = db.begin().await?;

    let created_by = catalog::resolve_actor(&txn, acting_user).await?;
    catalog::require_supplier(&txn, input.supplier_id).await?;
    catalog::require_warehouse(&txn, input.warehouse_id).await?;
    require_products(&txn, &input.items).await?;

    let now = chrono::Utc::now();
    let order_no = match input.order_no.as_deref().map(str::trim) {
        Some("") => return Err(Error::validation("order number cannot be blank")),
        Some(number) => {
            let taken = PurchaseOrder::find()
                .filter(purchase_order::Column::OrderNo.eq(number))
                .one(&txn)
                .await?
                .is_some();
            if taken {
                return Err(Error::DuplicateNumber {
                    number: number.to_string(),
                });
            }
            number.to_string()
        }
        None => numbering::next_order_no(&txn, now.year()).await?,
    };

    let order = purchase_order::ActiveModel {
        order_no: Set(order_no),
        supplier_id: Set(input.supplier_id),
        warehouse_id: Set(input.warehouse_id),
        created_by: Set(created_by),
        status: Set(PurchaseOrderStatus::Draft),
        order_date: Set(input.order_date.unwrap_or(now)),
        expected_date: Set(input.expected_date),
        sent_date: Set(None),
        approved_date: Set(None),
        received_date: Set(None),
        subtotal: Set(totals.subtotal),
        tax_amount: Set(totals.tax_amount),
        discount_amount: Set(totals.discount_amount),
        total_amount: Set(totals.total_amount),
        paid_amount: Set(totals.paid_amount),
        due_amount: Set(totals.due_amount),
        notes: Set(input.notes),
        metadata: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    insert_items(&txn, order.id, &input.items, &amounts).await?;
    let details = load_details(&txn, order).await?;
    txn.commit().await?;

    info!(
        "Created purchase order {} for {} (total {})",
        details.order.order_no, details.supplier.name, details.order.total_amount
    );
    Ok(details)
}

/// Retrieves an active order with its lines, supplier and warehouse.
pub async fn get_purchase_order(
    db: &DatabaseConnection,
    order_id: i64,
) -> Result<PurchaseOrderDetails> {
    let order = load_order(db, order_id).await?;
    load_details(db, order).await
}

/// Lists active orders, newest first.
pub async fn list_purchase_orders(
    db: &DatabaseConnection,
    filter: PurchaseOrderFilter,
) -> Result<Vec<purchase_order::Model>> {
    let mut query = PurchaseOrder::find().filter(purchase_order::Column::IsActive.eq(true));
    if let Some(status) = filter.status {
        query = query.filter(purchase_order::Column::Status.eq(status));
    }
    if let Some(supplier_id) = filter.supplier_id {
        query = query.filter(purchase_order::Column::SupplierId.eq(supplier_id));
    }
    query
        .order_by_desc(purchase_order::Column::CreatedAt)
        .order_by_desc(purchase_order::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Edits a draft order.
///
/// Supplying `items` replaces the whole line set and recomputes the totals;
/// otherwise only the header fields are patched and the totals re-derived from
/// the stored subtotal.
#[instrument(skip(db, update, settings))]
pub async fn update_purchase_order(
    db: &DatabaseConnection,
    order_id: i64,
    update: PurchaseOrderUpdate,
    settings: &Settings,
) -> Result<PurchaseOrderDetails> {
    let amounts = update.items.as_deref().map(price_items).transpose()?;

    let txn = db.begin().await?;
    let order = load_order(&txn, order_id).await?;
    draft_only(&order, "only draft can be updated")?;

    if let Some(supplier_id) = update.supplier_id {
        catalog::require_supplier(&txn, supplier_id).await?;
    }
    if let Some(warehouse_id) = update.warehouse_id {
        catalog::require_warehouse(&txn, warehouse_id).await?;
    }

    let honor_tax_override = settings.purchasing.honor_tax_override;
    let discount_amount = update.discount_amount.unwrap_or(order.discount_amount);
    let paid_amount = update.paid_amount.unwrap_or(order.paid_amount);
    let totals = match (&update.items, &amounts) {
        (Some(items), Some(amounts)) => {
            require_products(&txn, items).await?;
            PurchaseOrderItem::delete_many()
                .filter(purchase_order_item::Column::PurchaseOrderId.eq(order.id))
                .exec(&txn)
                .await?;
            insert_items(&txn, order.id, items, amounts).await?;
            OrderTotals::from_lines(
                amounts,
                update.tax_amount,
                honor_tax_override,
                discount_amount,
                paid_amount,
            )?
        }
        _ => {
            let tax_amount = match update.tax_amount {
                Some(tax) if honor_tax_override => tax,
                _ => order.tax_amount,
            };
            OrderTotals::new(order.subtotal, tax_amount, discount_amount, paid_amount)?
        }
    };

    let mut active: purchase_order::ActiveModel = order.into();
    if let Some(supplier_id) = update.supplier_id {
        active.supplier_id = Set(supplier_id);
    }
    if let Some(warehouse_id) = update.warehouse_id {
        active.warehouse_id = Set(warehouse_id);
    }
    if update.expected_date.is_some() {
        active.expected_date = Set(update.expected_date);
    }
    if update.notes.is_some() {
        active.notes = Set(update.notes);
    }
    active.subtotal = Set(totals.subtotal);
    active.tax_amount = Set(totals.tax_amount);
    active.discount_amount = Set(totals.discount_amount);
    active.total_amount = Set(totals.total_amount);
    active.paid_amount = Set(totals.paid_amount);
    active.due_amount = Set(totals.due_amount);
    active.updated_at = Set(chrono::Utc::now());
    let order = active.update(&txn).await?;

    let details = load_details(&txn, order).await?;
    txn.commit().await?;

    debug!("Updated purchase order {}", details.order.order_no);
    Ok(details)
}

fn merge_reason(metadata: Option<Json>, reason: &str, at: DateTimeUtc) -> Json {
    let mut map = match metadata {
        Some(Json::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("reason".to_string(), Json::String(reason.to_string()));
    map.insert("reason_at".to_string(), Json::String(at.to_rfc3339()));
    Json::Object(map)
}

/// Moves an order to `status` if the lifecycle allows it.
///
/// Entering `Sent` or `Approved` stamps the matching date, entering either
/// received status stamps `received_date`. A `reason` is merged into the
/// metadata together with the time of the change.
#[instrument(skip(db))]
pub async fn update_purchase_order_status(
    db: &DatabaseConnection,
    order_id: i64,
    status: PurchaseOrderStatus,
    reason: Option<String>,
) -> Result<purchase_order::Model> {
    let order = load_order(db, order_id).await?;
    ensure_transition(order.status, status)?;

    let now = chrono::Utc::now();
    let from = order.status;
    let metadata = order.metadata.clone();
    let mut active: purchase_order::ActiveModel = order.into();
    active.status = Set(status);
    match status {
        PurchaseOrderStatus::Sent => active.sent_date = Set(Some(now)),
        PurchaseOrderStatus::Approved => active.approved_date = Set(Some(now)),
        PurchaseOrderStatus::PartialReceived | PurchaseOrderStatus::FullyReceived => {
            active.received_date = Set(Some(now));
        }
        _ => {}
    }
    if let Some(reason) = reason.as_deref() {
        active.metadata = Set(Some(merge_reason(metadata, reason, now)));
    }
    active.updated_at = Set(now);
    let order = active.update(db).await?;

    info!(
        "Purchase order {} moved from {} to {}",
        order.order_no,
        from.label(),
        status.label()
    );
    Ok(order)
}

/// Records goods received against an approved or partially received order.
///
/// Every line is checked before the order is marked received, and the whole
/// receipt runs in one transaction: a rejected line leaves inventory, the
/// ledger and the order untouched.
#[instrument(skip(db, items, settings))]
pub async fn receive_items(
    db: &DatabaseConnection,
    order_id: i64,
    items: &[ReceivedItem],
    acting_user: Option<i64>,
    settings: &Settings,
) -> Result<PurchaseOrderDetails> {
    if items.is_empty() {
        return Err(Error::validation("no items to receive"));
    }
    if let Some(item) = items.iter().find(|i| i.quantity <= 0) {
        return Err(Error::validation(format!(
            "received quantity for item {} must be positive, got {}",
            item.item_id, item.quantity
        )));
    }

    let txn = db.begin().await?;
    let created_by = catalog::resolve_actor(&txn, acting_user).await?;
    let order = load_order(&txn, order_id).await?;
    if !matches!(
        order.status,
        PurchaseOrderStatus::Approved | PurchaseOrderStatus::PartialReceived
    ) {
        return Err(Error::InvalidStatus {
            entity: "PurchaseOrder",
            id: order.id,
            status: order.status.label().to_string(),
            operation: "only approved or partially received orders can receive items",
        });
    }

    let mut lines = order_items(&txn, order.id).await?;
    let now = chrono::Utc::now();
    let received_on = now.date_naive();
    let mut value_received = Decimal::ZERO;

    for received in items {
        let line = lines
            .iter_mut()
            .find(|l| l.id == received.item_id)
            .ok_or(Error::NotFound {
                entity: "PurchaseOrderItem",
                id: received.item_id,
            })?;

        let total_received = line
            .quantity_received
            .checked_add(received.quantity)
            .filter(|total| *total <= line.quantity);
        let Some(total_received) = total_received else {
            return Err(Error::QuantityExceeded {
                product_id: line.product_id,
                ordered: line.quantity,
                received: line.quantity_received,
                requested: received.quantity,
            });
        };

        value_received += Decimal::from(received.quantity) * line.unit_price;
        line.quantity_received = total_received;

        purchase_order_item::ActiveModel {
            id: Set(line.id),
            quantity_received: Set(line.quantity_received),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        inventory::receive_into_batch(
            &txn,
            line.product_id,
            order.warehouse_id,
            received.quantity,
            line.unit_price,
            received_on,
        )
        .await?;
        inventory::record_movement(
            &txn,
            NewMovement {
                product_id: line.product_id,
                warehouse_id: order.warehouse_id,
                quantity: received.quantity,
                movement_type: MovementType::In,
                note: format!("Received from purchase order {}", order.order_no),
                created_by,
            },
        )
        .await?;
    }

    let status = if lines.iter().all(|l| l.quantity_received == l.quantity) {
        PurchaseOrderStatus::FullyReceived
    } else {
        PurchaseOrderStatus::PartialReceived
    };

    let value_received = round_money(value_received);
    if value_received > Decimal::ZERO {
        post_receipt(&txn, &order, value_received, created_by, settings).await?;
    }

    let mut active: purchase_order::ActiveModel = order.into();
    active.status = Set(status);
    active.received_date = Set(Some(now));
    active.updated_at = Set(now);
    let order = active.update(&txn).await?;

    let details = load_details(&txn, order).await?;
    txn.commit().await?;

    info!(
        "Received {} worth of goods on {}, now {}",
        value_received,
        details.order.order_no,
        status.label()
    );
    Ok(details)
}

/// Posts the receipt and, for prepaid orders, the proportional settlement.
async fn post_receipt<C>(
    db: &C,
    order: &purchase_order::Model,
    value_received: Decimal,
    created_by: Option<i64>,
    settings: &Settings,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let supplier = Supplier::find_by_id(order.supplier_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Supplier",
            id: order.supplier_id,
        })?;
    let payable =
        ledger::get_or_create_supplier_account(db, supplier.id, &supplier.name, &settings.ledger)
            .await?;
    let (inventory_account, cash_account) =
        ledger::ensure_base_accounts(db, &settings.ledger).await?;

    ledger::create_transaction(
        db,
        NewLedgerTransaction {
            reference_type: ReferenceType::PurchaseReceive,
            reference_id: order.id,
            payment_method: None,
            memo: Some(format!("Goods received on {}", order.order_no)),
            created_by,
            entries: vec![
                EntryLine::debit(
                    inventory_account.code,
                    value_received,
                    format!("Inventory received on {}", order.order_no),
                ),
                EntryLine::credit(
                    payable.code.clone(),
                    value_received,
                    format!("Payable to {}", supplier.name),
                ),
            ],
        },
    )
    .await?;

    if order.paid_amount <= Decimal::ZERO {
        return Ok(());
    }
    let Some(share) = proportional_payment(order.paid_amount, value_received, order.total_amount)
    else {
        debug!("Order {} has a zero total, no settlement posted", order.order_no);
        return Ok(());
    };

    let settled: Decimal =
        ledger::transactions_for_reference(db, ReferenceType::PurchasePayment, order.id)
            .await?
            .iter()
            .map(ledger::PostedTransaction::amount)
            .sum();
    let amount = share.min(order.paid_amount - settled);
    if amount <= Decimal::ZERO {
        return Ok(());
    }

    ledger::create_transaction(
        db,
        NewLedgerTransaction {
            reference_type: ReferenceType::PurchasePayment,
            reference_id: order.id,
            payment_method: None,
            memo: Some(format!("Prepayment settled on {}", order.order_no)),
            created_by,
            entries: vec![
                EntryLine::debit(payable.code, amount, format!("Settled with {}", supplier.name)),
                EntryLine::credit(
                    cash_account.code,
                    amount,
                    format!("Prepayment for {}", order.order_no),
                ),
            ],
        },
    )
    .await?;
    Ok(())
}

/// Soft-deletes a draft order.
#[instrument(skip(db))]
pub async fn remove_purchase_order(db: &DatabaseConnection, order_id: i64) -> Result<()> {
    let order = load_order(db, order_id).await?;
    draft_only(&order, "only draft can be deleted")?;

    let order_no = order.order_no.clone();
    let mut active: purchase_order::ActiveModel = order.into();
    active.is_active = Set(false);
    active.updated_at = Set(chrono::Utc::now());
    active.update(db).await?;

    info!("Removed purchase order {}", order_no);
    Ok(())
}
