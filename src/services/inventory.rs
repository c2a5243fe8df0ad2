//! Inventory reservation for the order-commit transaction.
//!
//! Validation and decrement run against the same transaction connection so
//! "check stock, then decrement" is atomic per row. A reservation is
//! all-or-nothing: any failing line aborts the whole order.

use crate::entities::{product, product_variant};
use crate::errors::{ServiceError, StockItemKind};
use crate::services::round_currency;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument};

/// One requested line, naming exactly one of product / variant.
#[derive(Debug, Clone)]
pub struct LineRequest {
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    /// Price actually charged for this line (may differ from the catalog
    /// price, e.g. a negotiated discount)
    pub unit_price: Decimal,
    /// Caller-supplied unit weight override for shipping
    pub weight_kg: Option<Decimal>,
}

/// A validated line with its display attributes for the receipt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReservedLine {
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// round(unit_price * quantity), fixed at commit time
    pub line_total: Decimal,
    #[serde(skip)]
    pub weight_kg: Option<Decimal>,
}

/// A pending stock decrement, one per distinct product/variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDecrement {
    pub kind: StockItemKind,
    pub id: i64,
    pub quantity: i32,
}

/// Outcome of a successful validation pass.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub lines: Vec<ReservedLine>,
    pub subtotal: Decimal,
    pub decrements: Vec<StockDecrement>,
}

/// Validates the requested lines against current tenant-scoped stock and
/// computes line totals and pending decrements.
///
/// Quantities are summed per distinct product/variant before the
/// sufficiency check, so an order repeating one item across lines cannot
/// pass per-line checks yet overdraw on the aggregate decrement.
#[instrument(skip(conn, requested), fields(tenant_id = tenant_id, line_count = requested.len()))]
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
    requested: &[LineRequest],
) -> Result<Reservation, ServiceError> {
    // Sum in i64 so many individually valid lines cannot overflow the
    // aggregate; the i32 stock domain is re-imposed in bounded_totals.
    let mut product_totals: BTreeMap<i64, i64> = BTreeMap::new();
    let mut variant_totals: BTreeMap<i64, i64> = BTreeMap::new();

    for line in requested {
        match (line.product_id, line.variant_id) {
            (Some(id), None) => {
                *product_totals.entry(id).or_default() += i64::from(line.quantity)
            }
            (None, Some(id)) => {
                *variant_totals.entry(id).or_default() += i64::from(line.quantity)
            }
            _ => {
                return Err(ServiceError::ValidationError(
                    "each line must reference exactly one of product_id or variant_id"
                        .to_string(),
                ))
            }
        }
    }

    let product_totals = bounded_totals(product_totals, StockItemKind::Product)?;
    let variant_totals = bounded_totals(variant_totals, StockItemKind::Variant)?;

    let products = load_products(conn, tenant_id, &product_totals).await?;
    let variants = load_variants(conn, tenant_id, &variant_totals).await?;

    // Aggregate sufficiency checks, in deterministic id order.
    for (&id, &needed) in &product_totals {
        let model = products
            .get(&id)
            .ok_or(ServiceError::ProductNotFound { kind: StockItemKind::Product, id })?;
        if model.quantity < needed {
            return Err(ServiceError::InsufficientStock {
                kind: StockItemKind::Product,
                id,
                requested: needed,
                available: model.quantity,
            });
        }
    }
    for (&id, &needed) in &variant_totals {
        let model = variants
            .get(&id)
            .ok_or(ServiceError::ProductNotFound { kind: StockItemKind::Variant, id })?;
        if model.quantity < needed {
            return Err(ServiceError::InsufficientStock {
                kind: StockItemKind::Variant,
                id,
                requested: needed,
                available: model.quantity,
            });
        }
    }

    let mut lines = Vec::with_capacity(requested.len());
    let mut subtotal = Decimal::ZERO;

    for line in requested {
        let (name, sku, stock_weight) = if let Some(id) = line.product_id {
            let model = products
                .get(&id)
                .ok_or(ServiceError::ProductNotFound { kind: StockItemKind::Product, id })?;
            (model.name.clone(), model.sku.clone(), model.weight_kg)
        } else {
            // Validated above: variant_id is present when product_id is not
            let id = line.variant_id.ok_or_else(|| {
                ServiceError::InternalError("line lost its item reference".to_string())
            })?;
            let model = variants
                .get(&id)
                .ok_or(ServiceError::ProductNotFound { kind: StockItemKind::Variant, id })?;
            (model.name.clone(), model.sku.clone(), model.weight_kg)
        };

        let line_total = round_currency(line.unit_price * Decimal::from(line.quantity));
        subtotal += line_total;

        lines.push(ReservedLine {
            product_id: line.product_id,
            variant_id: line.variant_id,
            name,
            sku,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total,
            weight_kg: line.weight_kg.or(stock_weight),
        });
    }

    let decrements = product_totals
        .iter()
        .map(|(&id, &quantity)| StockDecrement {
            kind: StockItemKind::Product,
            id,
            quantity,
        })
        .chain(variant_totals.iter().map(|(&id, &quantity)| StockDecrement {
            kind: StockItemKind::Variant,
            id,
            quantity,
        }))
        .collect();

    debug!(subtotal = %subtotal, "Reservation validated");

    Ok(Reservation {
        lines,
        subtotal,
        decrements,
    })
}

/// Applies the pending decrements, one guarded update per distinct item:
/// the row must still hold at least the reserved quantity. An update that
/// matches no row means a concurrent writer consumed the stock after our
/// validation read; the whole attempt is retried from scratch.
#[instrument(skip(conn, decrements), fields(decrement_count = decrements.len()))]
pub async fn apply_decrements<C: ConnectionTrait>(
    conn: &C,
    decrements: &[StockDecrement],
) -> Result<(), ServiceError> {
    for decrement in decrements {
        let rows_affected = match decrement.kind {
            StockItemKind::Product => product::Entity::update_many()
                .col_expr(
                    product::Column::Quantity,
                    Expr::col(product::Column::Quantity).sub(decrement.quantity),
                )
                .filter(product::Column::Id.eq(decrement.id))
                .filter(product::Column::Quantity.gte(decrement.quantity))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?
                .rows_affected,
            StockItemKind::Variant => product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Quantity,
                    Expr::col(product_variant::Column::Quantity).sub(decrement.quantity),
                )
                .filter(product_variant::Column::Id.eq(decrement.id))
                .filter(product_variant::Column::Quantity.gte(decrement.quantity))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?
                .rows_affected,
        };

        if rows_affected == 0 {
            return Err(ServiceError::TransientConflict(format!(
                "stock for {} {} changed during commit",
                decrement.kind, decrement.id
            )));
        }
    }

    Ok(())
}

/// Re-imposes the i32 stock domain on the i64 aggregate sums. A total that
/// cannot fit i32 can never be satisfied by any stock row, so it is rejected
/// before any stock read.
fn bounded_totals(
    totals: BTreeMap<i64, i64>,
    kind: StockItemKind,
) -> Result<BTreeMap<i64, i32>, ServiceError> {
    totals
        .into_iter()
        .map(|(id, needed)| {
            let needed = i32::try_from(needed).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "total requested quantity for {kind} {id} is out of range"
                ))
            })?;
            Ok((id, needed))
        })
        .collect()
}

async fn load_products<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
    totals: &BTreeMap<i64, i32>,
) -> Result<HashMap<i64, product::Model>, ServiceError> {
    if totals.is_empty() {
        return Ok(HashMap::new());
    }
    let models = product::Entity::find()
        .filter(product::Column::Id.is_in(totals.keys().copied()))
        .filter(product::Column::TenantId.eq(tenant_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(models.into_iter().map(|m| (m.id, m)).collect())
}

/// Variants are tenant-checked through their parent product; a variant whose
/// parent belongs to another tenant reads as not found.
async fn load_variants<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
    totals: &BTreeMap<i64, i32>,
) -> Result<HashMap<i64, product_variant::Model>, ServiceError> {
    if totals.is_empty() {
        return Ok(HashMap::new());
    }
    let models = product_variant::Entity::find()
        .filter(product_variant::Column::Id.is_in(totals.keys().copied()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let parent_ids: HashSet<i64> = models.iter().map(|m| m.product_id).collect();
    let owned_parents: HashSet<i64> = product::Entity::find()
        .filter(product::Column::Id.is_in(parent_ids))
        .filter(product::Column::TenantId.eq(tenant_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|m| m.id)
        .collect();

    Ok(models
        .into_iter()
        .filter(|m| owned_parents.contains(&m.product_id))
        .map(|m| (m.id, m))
        .collect())
}
