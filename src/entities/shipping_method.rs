use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const TYPE_FREE: &str = "free";
pub const TYPE_COURIER: &str = "courier";

/// A tenant-scoped stored shipping method. Read-only during order commit;
/// a one-time custom override may be supplied per order instead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipping_methods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    /// "free" or "courier"
    pub method_type: String,
    /// Courier methods only: compute cost from total order weight
    pub use_weight: bool,
    /// Fixed rate for non-weight couriers
    pub base_rate: Decimal,
    /// Per-kilogram rate for weight-based couriers
    pub rate_per_kg: Option<Decimal>,
    /// Informational free-shipping threshold; does not gate the calculation
    pub min_amount: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
