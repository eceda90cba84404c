//! Document and batch number generation.
//!
//! Order and return numbers look like `PO-2026-007` / `PR-2026-012`: a prefix,
//! the calendar year and a sequence that restarts at 1 every year. Batch
//! numbers look like `BATCH-<product>-<warehouse>-<YYMMDD>-<seq>`.

use crate::{
    entities::{
        InventoryBatch, PurchaseOrder, PurchaseReturn, inventory_batch, purchase_order,
        purchase_return,
    },
    errors::Result,
};
use chrono::{NaiveDate, TimeZone, Utc};
use sea_orm::{PaginatorTrait, QuerySelect, prelude::*};

/// Prefix of purchase order numbers
pub const ORDER_PREFIX: &str = "PO";
/// Prefix of purchase return numbers
pub const RETURN_PREFIX: &str = "PR";

/// Formats `<prefix>-<year>-<seq>` with the sequence zero-padded to 3 digits.
#[must_use]
pub fn format_document_no(prefix: &str, year: i32, sequence: u32) -> String {
    format!("{prefix}-{year}-{sequence:03}")
}

/// Parses `<prefix>-<year>-<seq>` into `(year, seq)`.
#[must_use]
pub fn parse_document_no(prefix: &str, number: &str) -> Option<(i32, u32)> {
    let rest = number.strip_prefix(prefix)?.strip_prefix('-')?;
    let (year, sequence) = rest.split_once('-')?;
    Some((year.parse().ok()?, sequence.parse().ok()?))
}

/// Sequence following `previous` when numbering in `year`.
///
/// A previous number from another year (or none at all) restarts the sequence at 1.
#[must_use]
pub fn next_sequence(previous: Option<(i32, u32)>, year: i32) -> u32 {
    match previous {
        Some((prev_year, sequence)) if prev_year == year => sequence.saturating_add(1),
        _ => 1,
    }
}

fn max_sequence<'a>(
    prefix: &str,
    year: i32,
    numbers: impl IntoIterator<Item = &'a str>,
) -> Option<u32> {
    numbers
        .into_iter()
        .filter_map(|n| parse_document_no(prefix, n))
        .filter(|(y, _)| *y == year)
        .map(|(_, seq)| seq)
        .max()
}

/// Next free purchase order number for `year`.
///
/// Follows the highest sequence already used in that year, which is the
/// sequence of the most recently created order under normal operation.
pub async fn next_order_no<C>(db: &C, year: i32) -> Result<String>
where
    C: ConnectionTrait,
{
    let year_prefix = format!("{ORDER_PREFIX}-{year}-");
    let numbers: Vec<String> = PurchaseOrder::find()
        .select_only()
        .column(purchase_order::Column::OrderNo)
        .filter(purchase_order::Column::OrderNo.starts_with(&year_prefix))
        .into_tuple()
        .all(db)
        .await?;

    let previous = max_sequence(ORDER_PREFIX, year, numbers.iter().map(String::as_str));
    let sequence = next_sequence(previous.map(|seq| (year, seq)), year);
    Ok(format_document_no(ORDER_PREFIX, year, sequence))
}

/// Next free purchase return number for `year`.
///
/// The sequence is one past the number of returns created this year, or past
/// the highest sequence already used, whichever is larger.
pub async fn next_return_no<C>(db: &C, year: i32) -> Result<String>
where
    C: ConnectionTrait,
{
    let (start, end) = year_bounds(year);
    let created_this_year = PurchaseReturn::find()
        .filter(purchase_return::Column::CreatedAt.gte(start))
        .filter(purchase_return::Column::CreatedAt.lt(end))
        .count(db)
        .await?;

    let year_prefix = format!("{RETURN_PREFIX}-{year}-");
    let numbers: Vec<String> = PurchaseReturn::find()
        .select_only()
        .column(purchase_return::Column::ReturnNo)
        .filter(purchase_return::Column::ReturnNo.starts_with(&year_prefix))
        .into_tuple()
        .all(db)
        .await?;

    let used = max_sequence(RETURN_PREFIX, year, numbers.iter().map(String::as_str)).unwrap_or(0);
    let counted = u32::try_from(created_this_year).unwrap_or(u32::MAX);
    let sequence = used.max(counted).saturating_add(1);
    Ok(format_document_no(RETURN_PREFIX, year, sequence))
}

fn year_bounds(year: i32) -> (DateTimeUtc, DateTimeUtc) {
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single();
    let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single();
    match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => (DateTimeUtc::MIN_UTC, DateTimeUtc::MAX_UTC),
    }
}

/// `BATCH-<product>-<warehouse>-<YYMMDD>-` prefix shared by all batches opened that day.
#[must_use]
pub fn batch_prefix(product_id: i64, warehouse_id: i64, date: NaiveDate) -> String {
    format!("BATCH-{product_id}-{warehouse_id}-{}-", date.format("%y%m%d"))
}

/// Next unused batch number for `(product, warehouse, date)`.
pub async fn next_batch_no<C>(
    db: &C,
    product_id: i64,
    warehouse_id: i64,
    date: NaiveDate,
) -> Result<String>
where
    C: ConnectionTrait,
{
    let prefix = batch_prefix(product_id, warehouse_id, date);
    let numbers: Vec<String> = InventoryBatch::find()
        .select_only()
        .column(inventory_batch::Column::BatchNo)
        .filter(inventory_batch::Column::BatchNo.starts_with(&prefix))
        .into_tuple()
        .all(db)
        .await?;

    let used = numbers
        .iter()
        .filter_map(|n| n.strip_prefix(&prefix)?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("{prefix}{:03}", used.saturating_add(1)))
}
