//! Line and order total computation.
//!
//! Money is rounded to 2 decimal places, half away from zero, at line level and
//! again on the order totals.

use crate::errors::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary value to 2 decimal places.
#[must_use]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Priced inputs of one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePricing {
    /// Quantity ordered
    pub quantity: i32,
    /// Price per unit
    pub unit_price: Decimal,
    /// Discount per unit
    pub discount_per_unit: Decimal,
    /// Tax rate in percent
    pub tax_rate: Decimal,
}

/// Computed amounts of one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    /// `quantity * unit_price - quantity * discount_per_unit`
    pub taxable: Decimal,
    /// `taxable * tax_rate / 100`
    pub tax: Decimal,
    /// `taxable + tax`
    pub total: Decimal,
}

impl LinePricing {
    /// Rejects non-positive quantities, negative prices, discounts above the
    /// unit price and tax rates outside 0-100.
    pub fn validate(&self) -> Result<()> {
        if self.quantity <= 0 {
            return Err(Error::validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(Error::validation(format!(
                "unit price cannot be negative, got {}",
                self.unit_price
            )));
        }
        if self.discount_per_unit < Decimal::ZERO || self.discount_per_unit > self.unit_price {
            return Err(Error::validation(format!(
                "discount per unit must be between 0 and the unit price {}, got {}",
                self.unit_price, self.discount_per_unit
            )));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE_HUNDRED {
            return Err(Error::validation(format!(
                "tax rate must be between 0 and 100, got {}",
                self.tax_rate
            )));
        }
        Ok(())
    }

    /// Computes the line's taxable amount, tax and total.
    #[must_use]
    pub fn amounts(&self) -> LineAmounts {
        let quantity = Decimal::from(self.quantity);
        let taxable = round_money(quantity * self.unit_price - quantity * self.discount_per_unit);
        let tax = round_money(taxable * self.tax_rate / Decimal::ONE_HUNDRED);
        LineAmounts {
            taxable,
            tax,
            total: taxable + tax,
        }
    }
}

/// Header amounts of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    /// Sum of line taxable amounts
    pub subtotal: Decimal,
    /// Order tax
    pub tax_amount: Decimal,
    /// Order-level discount
    pub discount_amount: Decimal,
    /// `subtotal + tax_amount - discount_amount`
    pub total_amount: Decimal,
    /// Amount already paid
    pub paid_amount: Decimal,
    /// `total_amount - paid_amount`
    pub due_amount: Decimal,
}

impl OrderTotals {
    /// Builds totals from explicit header figures.
    ///
    /// Fails when the discount or payment is negative, when the discount pushes
    /// the total below zero, or when the payment exceeds the total.
    pub fn new(
        subtotal: Decimal,
        tax_amount: Decimal,
        discount_amount: Decimal,
        paid_amount: Decimal,
    ) -> Result<Self> {
        if tax_amount < Decimal::ZERO {
            return Err(Error::validation("tax amount cannot be negative"));
        }
        if discount_amount < Decimal::ZERO {
            return Err(Error::validation("discount amount cannot be negative"));
        }
        if paid_amount < Decimal::ZERO {
            return Err(Error::validation("paid amount cannot be negative"));
        }

        let subtotal = round_money(subtotal);
        let tax_amount = round_money(tax_amount);
        let discount_amount = round_money(discount_amount);
        let paid_amount = round_money(paid_amount);
        let total_amount = subtotal + tax_amount - discount_amount;
        if total_amount < Decimal::ZERO {
            return Err(Error::validation(format!(
                "discount {discount_amount} exceeds subtotal plus tax {}",
                subtotal + tax_amount
            )));
        }
        if paid_amount > total_amount {
            return Err(Error::validation(format!(
                "paid amount {paid_amount} exceeds total amount {total_amount}"
            )));
        }

        Ok(Self {
            subtotal,
            tax_amount,
            discount_amount,
            total_amount,
            paid_amount,
            due_amount: total_amount - paid_amount,
        })
    }

    /// Sums line amounts into order totals.
    ///
    /// With `honor_tax_override` set, a supplied `tax_override` replaces the
    /// summed line tax; otherwise it is ignored.
    pub fn from_lines(
        lines: &[LineAmounts],
        tax_override: Option<Decimal>,
        honor_tax_override: bool,
        discount_amount: Decimal,
        paid_amount: Decimal,
    ) -> Result<Self> {
        let subtotal: Decimal = lines.iter().map(|l| l.taxable).sum();
        let line_tax: Decimal = lines.iter().map(|l| l.tax).sum();
        let tax_amount = match tax_override {
            Some(tax) if honor_tax_override => tax,
            _ => line_tax,
        };
        Self::new(subtotal, tax_amount, discount_amount, paid_amount)
    }
}

/// Total of a returned line, `price * returned_quantity`.
#[must_use]
pub fn return_line_total(price: Decimal, returned_quantity: i32) -> Decimal {
    round_money(price * Decimal::from(returned_quantity))
}

/// Share of `paid_amount` attributable to `value_received` out of `total_amount`.
///
/// Returns `None` when the order total is zero, since no proportion exists.
#[must_use]
pub fn proportional_payment(
    paid_amount: Decimal,
    value_received: Decimal,
    total_amount: Decimal,
) -> Option<Decimal> {
    if total_amount.is_zero() {
        return None;
    }
    Some(round_money(paid_amount * value_received / total_amount))
}
