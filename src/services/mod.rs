pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod quota;
pub mod sequence;
pub mod shipping;

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary value to a whole currency amount, half away from zero.
///
/// This is the rounding applied independently to the items subtotal, the
/// shipping cost, and the tax amount before they are summed into the order
/// total. Not banker's rounding: 10.5 rounds to 11, never 10.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
