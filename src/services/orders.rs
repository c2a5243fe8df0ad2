//! The order-commit transaction coordinator.
//!
//! Turns a proposed set of line items into a durable, uniquely numbered
//! sale inside one atomic unit of work: quota check, customer check,
//! inventory reservation, shipping and totals, bill-number allocation,
//! persistence, stock decrements. Any abort leaves inventory, usage
//! counters, and bill sequences exactly as they were, so the retry
//! executor can safely run the whole attempt again.

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        customer, order, order_line,
        order::{
            BILLING_MODE_OFFLINE, BILLING_MODE_ONLINE, FULFILLMENT_UNFULFILLED,
            PAYMENT_STATUS_PENDING, STATUS_PAYMENT_PENDING,
        },
        shipping_method, tenant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    retry::RetryExecutor,
    services::{
        inventory::{self, LineRequest, ReservedLine},
        quota::UsageQuotaGuard,
        round_currency,
        sequence::BillNumberAllocator,
        shipping::{self, CustomShipping, ShippingDescriptor, WeighedLine},
    },
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

lazy_static! {
    static ref ORDER_COMMITS: IntCounter = IntCounter::new(
        "order_commits_total",
        "Total number of successfully committed orders"
    )
    .expect("metric can be created");
    static ref ORDER_COMMIT_FAILURES: IntCounter = IntCounter::new(
        "order_commit_failures_total",
        "Total number of failed order commits"
    )
    .expect("metric can be created");
}

/// One proposed line item. References exactly one of product / variant.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_item_reference", skip_on_field_errors = false))]
pub struct CommitOrderItem {
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(custom = "validate_non_negative")]
    pub unit_price: Decimal,
    /// Caller's view of the line total; recomputed authoritatively at commit
    #[validate(custom = "validate_non_negative")]
    #[serde(default)]
    pub line_total: Decimal,
    pub weight_kg: Option<Decimal>,
}

/// A commit request as consumed by the coordinator. The tenant id comes from
/// the caller's session layer, never from this payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CommitOrderRequest {
    #[validate(range(min = 1, message = "Customer id must be positive"))]
    pub customer_id: i64,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<CommitOrderItem>,
    pub shipping_method_id: Option<i64>,
    pub custom_shipping: Option<CustomShipping>,
    #[validate(custom = "validate_non_negative")]
    #[serde(default)]
    pub tax_amount: Decimal,
    #[validate(custom = "validate_non_negative")]
    #[serde(default)]
    pub amount_paid: Decimal,
    #[validate(custom = "validate_billing_mode")]
    #[serde(default = "default_billing_mode")]
    pub billing_mode: String,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub sales_source: Option<String>,
}

fn default_billing_mode() -> String {
    BILLING_MODE_ONLINE.to_string()
}

fn validate_billing_mode(mode: &str) -> Result<(), ValidationError> {
    if mode == BILLING_MODE_ONLINE || mode == BILLING_MODE_OFFLINE {
        return Ok(());
    }
    Err(ValidationError::new("billing_mode_must_be_online_or_offline"))
}

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount < Decimal::ZERO {
        return Err(ValidationError::new("amount_must_not_be_negative"));
    }
    Ok(())
}

fn validate_item_reference(item: &CommitOrderItem) -> Result<(), ValidationError> {
    match (item.product_id, item.variant_id) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        _ => Err(ValidationError::new(
            "exactly_one_of_product_id_or_variant_id",
        )),
    }
}

/// Full request validation: the request itself plus every item.
fn validate_request(request: &CommitOrderRequest) -> Result<(), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    for item in &request.items {
        item.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    }
    Ok(())
}

/// Customer state captured at commit time for the receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<customer::Model> for CustomerSnapshot {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            phone: model.phone,
            address: model.address,
        }
    }
}

/// Everything the caller needs after a successful commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitOrderResult {
    pub order: order::Model,
    pub tenant_sequence: i64,
    pub composite_number: i64,
    pub total_amount: Decimal,
    pub items_subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub shipping: ShippingDescriptor,
    pub customer: CustomerSnapshot,
    pub lines: Vec<ReservedLine>,
}

/// Service owning the commit transaction boundary.
#[derive(Clone)]
pub struct OrderCommitService {
    db: Arc<DbPool>,
    quota: UsageQuotaGuard,
    allocator: BillNumberAllocator,
    retry: RetryExecutor,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderCommitService {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            quota: UsageQuotaGuard::new(config.billing.quota_ceiling),
            allocator: BillNumberAllocator::new(config.billing.sequence_multiplier),
            retry: RetryExecutor::new((&config.retry).into()),
            event_sender,
        }
    }

    /// Commits one order for the tenant, retrying transient datastore
    /// conflicts up to the configured budget. Every retry re-runs the whole
    /// attempt and draws a fresh bill number.
    #[instrument(skip(self, request), fields(tenant_id = tenant_id, customer_id = request.customer_id, item_count = request.items.len()))]
    pub async fn commit_order(
        &self,
        tenant_id: i64,
        request: CommitOrderRequest,
    ) -> Result<CommitOrderResult, ServiceError> {
        validate_request(&request).map_err(|e| {
            ORDER_COMMIT_FAILURES.inc();
            e
        })?;

        let result = self
            .retry
            .run(|| self.attempt_commit(tenant_id, &request))
            .await;

        match result {
            Ok(outcome) => {
                ORDER_COMMITS.inc();
                info!(
                    order_id = %outcome.order.id,
                    composite_number = outcome.composite_number,
                    total_amount = %outcome.total_amount,
                    "Order committed"
                );
                self.emit_committed_event(&outcome).await;
                Ok(outcome)
            }
            Err(err) => {
                ORDER_COMMIT_FAILURES.inc();
                if let ServiceError::QuotaExceeded { .. } = err {
                    // The in-transaction cycle reset was rolled back with the
                    // rejected order; re-apply it so the cycle moves on.
                    if let Err(rollover_err) = self
                        .quota
                        .persist_cycle_rollover(&*self.db, tenant_id, Utc::now())
                        .await
                    {
                        warn!(
                            tenant_id = tenant_id,
                            error = %rollover_err,
                            "Failed to persist quota cycle rollover after rejection"
                        );
                    }
                }
                error!(tenant_id = tenant_id, error = %err, "Order commit failed");
                Err(err)
            }
        }
    }

    /// One full commit attempt inside one transaction.
    async fn attempt_commit(
        &self,
        tenant_id: i64,
        request: &CommitOrderRequest,
    ) -> Result<CommitOrderResult, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        match self.run_commit_steps(&txn, tenant_id, request).await {
            Ok(outcome) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed commit attempt errored");
                }
                Err(err)
            }
        }
    }

    async fn run_commit_steps(
        &self,
        txn: &DatabaseTransaction,
        tenant_id: i64,
        request: &CommitOrderRequest,
    ) -> Result<CommitOrderResult, ServiceError> {
        let now = Utc::now();

        // 1. Quota: check-and-count inside the transaction so a breach
        //    cannot race with a concurrent commit from the same tenant.
        let tenant_row = tenant::Entity::find_by_id(tenant_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Tenant {tenant_id} not found")))?;
        self.quota.check_and_increment(txn, tenant_row, now).await?;

        // 2. Customer must belong to the tenant.
        let customer_row = customer::Entity::find_by_id(request.customer_id)
            .filter(customer::Column::TenantId.eq(tenant_id))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::CustomerNotFound {
                customer_id: request.customer_id,
            })?;

        // 3. Validate stock and fix line totals.
        let line_requests: Vec<LineRequest> = request
            .items
            .iter()
            .map(|item| LineRequest {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                weight_kg: item.weight_kg,
            })
            .collect();
        let reservation = inventory::reserve(txn, tenant_id, &line_requests).await?;

        // 4. Shipping, from the stored method or the one-time override.
        let stored_method = match request.shipping_method_id {
            Some(method_id) => Some(
                shipping_method::Entity::find_by_id(method_id)
                    .filter(shipping_method::Column::TenantId.eq(tenant_id))
                    .filter(shipping_method::Column::IsActive.eq(true))
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Shipping method {method_id} not found"))
                    })?,
            ),
            None => None,
        };
        let weighed: Vec<WeighedLine> = reservation
            .lines
            .iter()
            .map(|line| WeighedLine {
                quantity: line.quantity,
                weight_kg: line.weight_kg,
            })
            .collect();
        let (shipping_cost, shipping_descriptor) = shipping::calculate(
            stored_method.as_ref(),
            request.custom_shipping.as_ref(),
            &weighed,
            reservation.subtotal,
        )?;

        // 5. Each component rounds independently before summing; this is a
        //    fixed contract, see round_currency.
        let items_subtotal = round_currency(reservation.subtotal);
        let shipping_rounded = round_currency(shipping_cost);
        let tax_rounded = round_currency(request.tax_amount);
        let total_amount = items_subtotal + shipping_rounded + tax_rounded;

        // 6. Bill numbers, freshly drawn per attempt.
        let numbers = self.allocator.allocate(txn, tenant_id).await?;

        // 7. Persist the order and its lines.
        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            tenant_id: Set(tenant_id),
            customer_id: Set(customer_row.id),
            tenant_sequence: Set(numbers.sequence),
            composite_number: Set(numbers.composite),
            total_amount: Set(total_amount),
            amount_paid: Set(request.amount_paid),
            balance: Set(total_amount - request.amount_paid),
            billing_mode: Set(request.billing_mode.clone()),
            payment_method: Set(request.payment_method.clone()),
            status: Set(STATUS_PAYMENT_PENDING.to_string()),
            payment_status: Set(PAYMENT_STATUS_PENDING.to_string()),
            fulfillment_status: Set(FULFILLMENT_UNFULFILLED.to_string()),
            order_date: Set(now),
            notes: Set(request.notes.clone()),
            tax_amount: Set(tax_rounded),
            shipping_cost: Set(shipping_rounded),
            sales_source: Set(request.sales_source.clone()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;

        for line in &reservation.lines {
            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                name: Set(line.name.clone()),
                sku: Set(line.sku.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total),
                created_at: Set(now),
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        // 8. Decrement stock, same atomic unit as the validation above.
        inventory::apply_decrements(txn, &reservation.decrements).await?;

        Ok(CommitOrderResult {
            tenant_sequence: numbers.sequence,
            composite_number: numbers.composite,
            total_amount,
            items_subtotal,
            shipping_cost: shipping_rounded,
            tax_amount: tax_rounded,
            shipping: shipping_descriptor,
            customer: customer_row.into(),
            lines: reservation.lines,
            order: order_model,
        })
    }

    /// Tenant-scoped read-back of a committed order with its lines.
    #[instrument(skip(self), fields(tenant_id = tenant_id, order_id = %order_id))]
    pub async fn get_order(
        &self,
        tenant_id: i64,
        order_id: Uuid,
    ) -> Result<Option<(order::Model, Vec<order_line::Model>)>, ServiceError> {
        let order_row = order::Entity::find_by_id(order_id)
            .filter(order::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let Some(order_row) = order_row else {
            return Ok(None);
        };

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .order_by_asc(order_line::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(Some((order_row, lines)))
    }

    async fn emit_committed_event(&self, outcome: &CommitOrderResult) {
        let Some(sender) = &self.event_sender else {
            return;
        };
        let event = Event::OrderCommitted {
            order_id: outcome.order.id,
            tenant_id: outcome.order.tenant_id,
            composite_number: outcome.composite_number,
            total_amount: outcome.total_amount,
            committed_at: outcome.order.created_at,
        };
        if let Err(e) = sender.send(event).await {
            warn!(order_id = %outcome.order.id, error = %e, "Failed to send order committed event");
        }
    }
}
