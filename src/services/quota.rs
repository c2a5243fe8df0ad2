//! Monthly usage quota enforcement for non-pro tenants.
//!
//! The counter and its cycle boundary live on the tenant row and are
//! mutated only here, through value-guarded updates. The previously read
//! counter value doubles as an optimistic version: a lost race surfaces as
//! a transient conflict and the whole commit attempt is retried.

use crate::entities::tenant;
use crate::errors::ServiceError;
use chrono::{DateTime, Datelike, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument};

/// Adds one calendar month, clamping the day so the result never overflows
/// into the month after next (Jan 31 -> Feb 28/29, Oct 31 -> Nov 30).
pub fn add_one_month_clamped(date: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let day = date.day().min(days_in_month(year, month));

    date.with_day(1)
        .and_then(|d| d.with_year(year))
        .and_then(|d| d.with_month(month))
        .and_then(|d| d.with_day(day))
        .unwrap_or(date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
    }
}

/// Guards order creation against the tenant's monthly ceiling.
#[derive(Debug, Clone)]
pub struct UsageQuotaGuard {
    ceiling: i32,
}

impl UsageQuotaGuard {
    pub fn new(ceiling: i32) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> i32 {
        self.ceiling
    }

    /// Applies the quota protocol for one commit attempt, inside the commit
    /// transaction: roll the cycle over if its boundary has passed, enforce
    /// the ceiling, then count this order. Returns the tenant state as left
    /// behind.
    ///
    /// Pro tenants pass through untouched.
    #[instrument(skip(self, conn, tenant), fields(tenant_id = tenant.id))]
    pub async fn check_and_increment<C: ConnectionTrait>(
        &self,
        conn: &C,
        tenant: tenant::Model,
        now: DateTime<Utc>,
    ) -> Result<tenant::Model, ServiceError> {
        if tenant.is_pro() {
            return Ok(tenant);
        }

        let tenant = if now >= tenant.cycle_ends_at {
            self.roll_cycle(conn, tenant, now).await?
        } else {
            tenant
        };

        if tenant.monthly_usage >= self.ceiling {
            return Err(ServiceError::QuotaExceeded {
                used: tenant.monthly_usage,
                ceiling: self.ceiling,
            });
        }

        let seen_usage = tenant.monthly_usage;
        let rows_affected = tenant::Entity::update_many()
            .col_expr(
                tenant::Column::MonthlyUsage,
                Expr::col(tenant::Column::MonthlyUsage).add(1),
            )
            .filter(tenant::Column::Id.eq(tenant.id))
            .filter(tenant::Column::MonthlyUsage.eq(seen_usage))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?
            .rows_affected;

        if rows_affected == 0 {
            return Err(ServiceError::TransientConflict(format!(
                "usage counter for tenant {} changed during commit",
                tenant.id
            )));
        }

        Ok(tenant::Model {
            monthly_usage: seen_usage + 1,
            ..tenant
        })
    }

    /// Re-applies a due cycle rollover outside an aborted commit.
    ///
    /// A rejected order rolls its transaction back, and with it any cycle
    /// reset applied inside; this keeps a blocked tenant's cycle from
    /// getting stuck. No-op when the boundary has not actually passed.
    #[instrument(skip(self, conn), fields(tenant_id = tenant_id))]
    pub async fn persist_cycle_rollover<C: ConnectionTrait>(
        &self,
        conn: &C,
        tenant_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let tenant = tenant::Entity::find_by_id(tenant_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Tenant {tenant_id} not found")))?;

        if tenant.is_pro() || now < tenant.cycle_ends_at {
            return Ok(());
        }

        self.roll_cycle(conn, tenant, now).await?;
        Ok(())
    }

    async fn roll_cycle<C: ConnectionTrait>(
        &self,
        conn: &C,
        tenant: tenant::Model,
        now: DateTime<Utc>,
    ) -> Result<tenant::Model, ServiceError> {
        let old_boundary = tenant.cycle_ends_at;
        let mut new_boundary = add_one_month_clamped(old_boundary);
        // A tenant dormant for several cycles catches up to a boundary
        // ahead of now rather than resetting once per commit.
        while new_boundary <= now {
            new_boundary = add_one_month_clamped(new_boundary);
        }

        let rows_affected = tenant::Entity::update_many()
            .col_expr(tenant::Column::MonthlyUsage, Expr::value(0))
            .col_expr(tenant::Column::CycleEndsAt, Expr::value(new_boundary))
            .filter(tenant::Column::Id.eq(tenant.id))
            .filter(tenant::Column::CycleEndsAt.eq(old_boundary))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?
            .rows_affected;

        if rows_affected == 0 {
            return Err(ServiceError::TransientConflict(format!(
                "usage cycle for tenant {} rolled over concurrently",
                tenant.id
            )));
        }

        info!(
            tenant_id = tenant.id,
            %old_boundary,
            %new_boundary,
            "Usage cycle rolled over"
        );

        Ok(tenant::Model {
            monthly_usage: 0,
            cycle_ends_at: new_boundary,
            ..tenant
        })
    }
}
