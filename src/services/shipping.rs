//! Shipping cost calculation.
//!
//! Pure: no I/O and no failure modes beyond rejecting a negative custom
//! amount. The descriptive record feeds the customer-facing receipt.

use crate::entities::shipping_method::{self, TYPE_COURIER, TYPE_FREE};
use crate::errors::ServiceError;
use crate::services::round_currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One-time shipping override supplied with a single order. Takes precedence
/// over any stored method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomShipping {
    pub amount: Decimal,
    pub label: Option<String>,
}

/// How a computed shipping cost came about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingKind {
    Custom,
    Free,
    Courier,
    None,
}

/// Descriptive record of the shipping charge for the receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingDescriptor {
    pub name: String,
    pub kind: ShippingKind,
    pub cost: Decimal,
    pub base_rate: Decimal,
}

/// Weight-bearing view of an order line, all the calculator needs.
#[derive(Debug, Clone)]
pub struct WeighedLine {
    pub quantity: i32,
    pub weight_kg: Option<Decimal>,
}

/// Computes the shipping cost for an order.
///
/// Priority: custom override, then the stored method (free / weight-based
/// courier / fixed-rate courier), then zero when neither is present. The
/// free-shipping minimum-amount threshold on stored methods is informational
/// only and never gates the result.
pub fn calculate(
    method: Option<&shipping_method::Model>,
    custom: Option<&CustomShipping>,
    lines: &[WeighedLine],
    _subtotal: Decimal,
) -> Result<(Decimal, ShippingDescriptor), ServiceError> {
    if let Some(custom) = custom {
        if custom.amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "custom shipping amount must not be negative".to_string(),
            ));
        }
        // Rounded like every other component, so the receipt record and the
        // persisted charge cannot disagree.
        let cost = round_currency(custom.amount);
        let descriptor = ShippingDescriptor {
            name: custom
                .label
                .clone()
                .unwrap_or_else(|| "Custom shipping".to_string()),
            kind: ShippingKind::Custom,
            cost,
            base_rate: cost,
        };
        return Ok((cost, descriptor));
    }

    let Some(method) = method else {
        let descriptor = ShippingDescriptor {
            name: "No shipping".to_string(),
            kind: ShippingKind::None,
            cost: Decimal::ZERO,
            base_rate: Decimal::ZERO,
        };
        return Ok((Decimal::ZERO, descriptor));
    };

    let (cost, kind) = match method.method_type.as_str() {
        TYPE_FREE => (Decimal::ZERO, ShippingKind::Free),
        TYPE_COURIER if method.use_weight => {
            let rate = method.rate_per_kg.unwrap_or(Decimal::ZERO);
            let total_weight: Decimal = lines
                .iter()
                .map(|line| {
                    line.weight_kg.unwrap_or(Decimal::ZERO) * Decimal::from(line.quantity)
                })
                .sum();
            (round_currency(total_weight * rate), ShippingKind::Courier)
        }
        TYPE_COURIER => (round_currency(method.base_rate), ShippingKind::Courier),
        // Unknown stored type behaves like no method at all
        _ => (Decimal::ZERO, ShippingKind::None),
    };

    let descriptor = ShippingDescriptor {
        name: method.name.clone(),
        kind,
        cost,
        base_rate: method.base_rate,
    };

    Ok((cost, descriptor))
}
