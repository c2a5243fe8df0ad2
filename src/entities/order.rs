use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const STATUS_PAYMENT_PENDING: &str = "payment_pending";
pub const PAYMENT_STATUS_PENDING: &str = "pending";
pub const FULFILLMENT_UNFULFILLED: &str = "unfulfilled";
pub const BILLING_MODE_ONLINE: &str = "online";
pub const BILLING_MODE_OFFLINE: &str = "offline";

/// A durable, uniquely numbered sale. Created exactly once per successful
/// commit; totals and stock effects are immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: i64,
    pub customer_id: i64,
    /// Tenant-local sequence number shown to end users
    pub tenant_sequence: i64,
    /// `tenant_id * multiplier + tenant_sequence`; globally unique
    #[sea_orm(unique)]
    pub composite_number: i64,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    /// "online" or "offline"
    pub billing_mode: String,
    pub payment_method: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub fulfillment_status: String,
    pub order_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub sales_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::order_line::Entity")]
    OrderLines,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
