//! Costing math shared by the ledger and the reconciliation engine
//!
//! Money amounts are rounded to cents, half away from zero. Per-unit costs and
//! quantities keep [`UNIT_COST_SCALE`] decimal places so a weighted average
//! maintained incrementally stays within a hundredth of a cent of the value
//! re-derived from the full purchase history.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for extended money amounts
pub const MONEY_SCALE: u32 = 2;

/// Decimal places kept for per-unit costs and quantities
pub const UNIT_COST_SCALE: u32 = 6;

/// Default allowed gap between an invoice total and its line sum
pub const DEFAULT_DRIFT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Round an extended amount to cents
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a per-unit cost or a quantity to the storage scale
pub fn round_unit(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(UNIT_COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Extended price of a line: quantity times unit price, in cents
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round_money(quantity * unit_price)
}

/// New moving-average unit cost after receiving `quantity` at `unit_price`.
///
/// `on_hand` below zero carries no cost weight. When nothing is left to
/// weight against, the purchase price becomes the average.
pub fn weighted_average(
    on_hand: Decimal,
    current_average: Decimal,
    quantity: Decimal,
    unit_price: Decimal,
) -> Decimal {
    let weighted_on_hand = on_hand.max(Decimal::ZERO);
    let total_quantity = weighted_on_hand + quantity;
    if total_quantity.is_zero() {
        return round_unit(unit_price);
    }
    round_unit((weighted_on_hand * current_average + quantity * unit_price) / total_quantity)
}

/// Quantity-weighted mean of `(quantity, price)` pairs; `None` when no quantity
pub fn historical_average(purchases: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let total_quantity: Decimal = purchases.iter().map(|(q, _)| *q).sum();
    if total_quantity.is_zero() {
        return None;
    }
    let total_value: Decimal = purchases.iter().map(|(q, p)| q * p).sum();
    Some(total_value / total_quantity)
}

/// Sum of line totals, rounded to cents
pub fn sum_line_totals<'a>(totals: impl IntoIterator<Item = &'a Decimal>) -> Decimal {
    round_money(totals.into_iter().copied().sum())
}

/// Gap between the re-derived line sum and the stored total, if it exceeds
/// `tolerance`. A gap exactly equal to the tolerance is accepted.
pub fn drift(stored_total: Decimal, line_sum: Decimal, tolerance: Decimal) -> Option<Decimal> {
    let difference = round_money(line_sum) - round_money(stored_total);
    if difference.abs() > tolerance {
        Some(difference)
    } else {
        None
    }
}

/// Quantity of a base ingredient needed to produce `quantity_needed` of a
/// composite whose batch yields `batch_output_size`
pub fn scale_component(
    quantity_needed: Decimal,
    quantity_per_batch: Decimal,
    batch_output_size: Decimal,
) -> Decimal {
    if batch_output_size.is_zero() {
        return Decimal::ZERO;
    }
    round_unit(quantity_per_batch * quantity_needed / batch_output_size)
}
