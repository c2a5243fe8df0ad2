//! Per-tenant bill number allocation.
//!
//! The sequence increment is an atomic read-modify-write on the tenant row
//! inside the commit transaction; concurrent commits from one tenant
//! serialize on it, which is what makes sequence numbers strictly
//! increasing in commit order. An aborted transaction rolls the increment
//! back, so a retried attempt draws a fresh number.

use crate::entities::tenant;
use crate::errors::ServiceError;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{error, instrument};

/// The two numbers assigned to every committed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillNumbers {
    /// Tenant-local sequence number, shown to end users
    pub sequence: i64,
    /// `tenant_id * multiplier + sequence`, globally unique
    pub composite: i64,
}

#[derive(Debug, Clone)]
pub struct BillNumberAllocator {
    multiplier: i64,
}

impl BillNumberAllocator {
    pub fn new(multiplier: i64) -> Self {
        Self { multiplier }
    }

    /// Draws the tenant's next sequence number and derives the composite.
    #[instrument(skip(self, conn), fields(tenant_id = tenant_id))]
    pub async fn allocate<C: ConnectionTrait>(
        &self,
        conn: &C,
        tenant_id: i64,
    ) -> Result<BillNumbers, ServiceError> {
        let rows_affected = tenant::Entity::update_many()
            .col_expr(
                tenant::Column::BillSequence,
                Expr::col(tenant::Column::BillSequence).add(1),
            )
            .filter(tenant::Column::Id.eq(tenant_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?
            .rows_affected;

        if rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Tenant {tenant_id} not found"
            )));
        }

        // Read back our own write within the transaction.
        let tenant = tenant::Entity::find_by_id(tenant_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Tenant {tenant_id} not found")))?;

        let sequence = tenant.bill_sequence;
        if sequence >= self.multiplier {
            // Issuing past the multiplier would silently collide with the
            // next tenant's composite space.
            error!(
                tenant_id = tenant_id,
                sequence = sequence,
                multiplier = self.multiplier,
                "Bill sequence space exhausted"
            );
            return Err(ServiceError::InternalError(format!(
                "bill sequence space exhausted for tenant {tenant_id}"
            )));
        }

        Ok(BillNumbers {
            sequence,
            composite: tenant_id * self.multiplier + sequence,
        })
    }
}
