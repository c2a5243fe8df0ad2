//! Shared harness for commit-flow integration tests: an in-memory SQLite
//! datastore with the schema created from the entities, plus seed helpers.

use billing_core::entities::{
    customer, product, product_variant, shipping_method, tenant,
};
use billing_core::{AppConfig, OrderCommitService};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, EntityTrait,
    Schema, Set,
};
use std::sync::Arc;

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub service: OrderCommitService,
    pub config: AppConfig,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect to in-memory sqlite");

        let schema = Schema::new(DbBackend::Sqlite);
        let backend = db.get_database_backend();
        let statements = [
            schema.create_table_from_entity(tenant::Entity),
            schema.create_table_from_entity(customer::Entity),
            schema.create_table_from_entity(product::Entity),
            schema.create_table_from_entity(product_variant::Entity),
            schema.create_table_from_entity(shipping_method::Entity),
            schema.create_table_from_entity(billing_core::entities::order::Entity),
            schema.create_table_from_entity(billing_core::entities::order_line::Entity),
        ];
        for statement in statements {
            db.execute(backend.build(&statement))
                .await
                .expect("create table");
        }

        let db = Arc::new(db);
        let service = OrderCommitService::new(db.clone(), &config, None);

        Self {
            db,
            service,
            config,
        }
    }

    pub async fn seed_tenant(&self, id: i64, plan: &str, monthly_usage: i32) -> tenant::Model {
        self.seed_tenant_with_cycle(id, plan, monthly_usage, Utc::now() + Duration::days(10))
            .await
    }

    pub async fn seed_tenant_with_cycle(
        &self,
        id: i64,
        plan: &str,
        monthly_usage: i32,
        cycle_ends_at: DateTime<Utc>,
    ) -> tenant::Model {
        tenant::ActiveModel {
            id: Set(id),
            name: Set(format!("Tenant {id}")),
            phone: Set(None),
            plan: Set(plan.to_string()),
            monthly_usage: Set(monthly_usage),
            cycle_ends_at: Set(cycle_ends_at),
            bill_sequence: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed tenant")
    }

    pub async fn seed_customer(&self, id: i64, tenant_id: i64) -> customer::Model {
        customer::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            name: Set(format!("Customer {id}")),
            phone: Set(Some("5550100".to_string())),
            address: Set(Some("12 Market Street".to_string())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed customer")
    }

    pub async fn seed_product(
        &self,
        id: i64,
        tenant_id: i64,
        price: Decimal,
        quantity: i32,
    ) -> product::Model {
        self.seed_product_with_weight(id, tenant_id, price, quantity, None)
            .await
    }

    pub async fn seed_product_with_weight(
        &self,
        id: i64,
        tenant_id: i64,
        price: Decimal,
        quantity: i32,
        weight_kg: Option<Decimal>,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            name: Set(format!("Product {id}")),
            sku: Set(Some(format!("SKU-{id:04}"))),
            price: Set(price),
            quantity: Set(quantity),
            weight_kg: Set(weight_kg),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        id: i64,
        product_id: i64,
        price: Decimal,
        quantity: i32,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            name: Set(format!("Variant {id}")),
            sku: Set(Some(format!("VAR-{id:04}"))),
            price: Set(price),
            quantity: Set(quantity),
            weight_kg: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant")
    }

    pub async fn seed_shipping_method(
        &self,
        id: i64,
        tenant_id: i64,
        method_type: &str,
        use_weight: bool,
        base_rate: Decimal,
        rate_per_kg: Option<Decimal>,
    ) -> shipping_method::Model {
        shipping_method::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            name: Set(format!("Method {id}")),
            method_type: Set(method_type.to_string()),
            use_weight: Set(use_weight),
            base_rate: Set(base_rate),
            rate_per_kg: Set(rate_per_kg),
            min_amount: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed shipping method")
    }

    pub async fn tenant(&self, id: i64) -> tenant::Model {
        tenant::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query tenant")
            .expect("tenant exists")
    }

    pub async fn product(&self, id: i64) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    pub async fn variant(&self, id: i64) -> product_variant::Model {
        product_variant::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query variant")
            .expect("variant exists")
    }
}
