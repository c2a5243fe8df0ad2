//! Post-commit notification seam.
//!
//! Message delivery (SMS, WhatsApp) lives outside this crate; the trait
//! below is the narrow interface the caller plugs a sender into. It runs
//! strictly after the transaction commits and is fire-and-forget: a failed
//! notification never changes the commit outcome.

use crate::errors::ServiceError;
use crate::services::orders::CommitOrderResult;
use crate::services::shipping::ShippingDescriptor;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Payload handed to the delivery collaborator.
#[derive(Debug, Clone)]
pub struct OrderNotification {
    pub phone: Option<String>,
    pub tenant_name: String,
    pub items_summary: String,
    pub amount: Decimal,
    pub address: Option<String>,
    pub shipping: Option<ShippingDescriptor>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_order_confirmation(
        &self,
        notification: &OrderNotification,
    ) -> Result<(), ServiceError>;
}

/// Default sender that only logs; useful for tests and offline tenants.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send_order_confirmation(
        &self,
        notification: &OrderNotification,
    ) -> Result<(), ServiceError> {
        info!(
            tenant = %notification.tenant_name,
            amount = %notification.amount,
            items = %notification.items_summary,
            "Order confirmation (logging sender)"
        );
        Ok(())
    }
}

/// Builds the notification from a commit result and fires it, swallowing
/// and logging any delivery failure.
pub async fn notify_order_committed(
    sender: &dyn NotificationSender,
    tenant_name: &str,
    outcome: &CommitOrderResult,
) {
    let items_summary = outcome
        .lines
        .iter()
        .map(|line| format!("{} x{}", line.name, line.quantity))
        .collect::<Vec<_>>()
        .join(", ");

    let notification = OrderNotification {
        phone: outcome.customer.phone.clone(),
        tenant_name: tenant_name.to_string(),
        items_summary,
        amount: outcome.total_amount,
        address: outcome.customer.address.clone(),
        shipping: Some(outcome.shipping.clone()),
    };

    if let Err(e) = sender.send_order_confirmation(&notification).await {
        warn!(
            order_id = %outcome.order.id,
            error = %e,
            "Order confirmation delivery failed; commit outcome unaffected"
        );
    }
}
