//! GST-inclusive amount arithmetic.
//!
//! All money math stays in `Decimal`; floats never touch an amount.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::{GstType, ItemInput};

/// Line total: `(quantity * unit_rate) * (1 + gst_rate / 100)`, rounded to
/// two places with the half-away-from-zero rule used on printed bills.
pub fn compute_amount(quantity: Decimal, unit_rate: Decimal, total_gst_rate: Decimal) -> Decimal {
    let base = quantity * unit_rate;
    let gross = base * (Decimal::ONE + total_gst_rate / Decimal::ONE_HUNDRED);
    gross.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Effective total GST rate for one saved item under its order's regime.
///
/// Split regime sums the two domestic rates, interstate uses the single
/// rate, and an unknown regime contributes no tax.
pub fn total_gst_rate(gst_type: Option<GstType>, input: &ItemInput) -> Decimal {
    match gst_type {
        Some(GstType::CgstSgst) => {
            input.cgst_rate.unwrap_or(Decimal::ZERO) + input.sgst_rate.unwrap_or(Decimal::ZERO)
        }
        Some(GstType::Igst) => input.gst_rate.unwrap_or(Decimal::ZERO),
        None => Decimal::ZERO,
    }
}
