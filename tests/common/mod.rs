// Cenário compartilhado pelos testes de integração: duas organizações, uma
// filial cada, e um super-admin.
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use uuid::Uuid;

use inventory_engine::{
    config::AppState,
    db::{
        memory_store::{ProfileRow, Tables},
        MemoryStore,
    },
    models::{
        auth::Claims,
        catalog::{Category, Product, Warehouse},
        tenancy::{Branch, Organization, TenantContext, SUPER_ADMIN_ROLE},
    },
    services::orchestrator::CompensationSettings,
};

pub const SECRET: &str = "segredo-de-teste";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub org: Uuid,
    pub branch: Uuid,
    pub user: Uuid,
    pub foreign_user: Uuid,
    pub super_admin: Uuid,
    pub orphan_user: Uuid,
    pub category: Uuid,
    pub products: [Uuid; 2],
    pub warehouses: [Uuid; 2],
    pub foreign_product: Uuid,
    pub foreign_warehouse: Uuid,
}

fn product(organization_id: Uuid, category_id: Option<Uuid>, cost: i64, price: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        organization_id,
        category_id,
        name: format!("Produto {}", price),
        barcode: None,
        cost_price: Decimal::from(cost),
        selling_price: Decimal::from(price),
    }
}

fn warehouse(organization_id: Uuid, branch_id: Uuid) -> Warehouse {
    Warehouse { id: Uuid::new_v4(), organization_id, branch_id: Some(branch_id), name: "Depósito".into(), location: None }
}

impl Fixture {
    pub fn new() -> Self {
        let (org, foreign_org) = (Uuid::new_v4(), Uuid::new_v4());
        let (branch, foreign_branch) = (Uuid::new_v4(), Uuid::new_v4());
        let (user, foreign_user, super_admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let category = Category { id: Uuid::new_v4(), organization_id: org, name: "Bebidas".into() };
        let p1 = product(org, Some(category.id), 60, 100);
        let p2 = product(org, None, 50, 70);
        let pf = product(foreign_org, None, 1, 2);
        let (w1, w2, wf) = (warehouse(org, branch), warehouse(org, branch), warehouse(foreign_org, foreign_branch));

        let products = [p1.id, p2.id];
        let warehouses = [w1.id, w2.id];
        let (foreign_product, foreign_warehouse, category_id) = (pf.id, wf.id, category.id);

        let tables = Tables {
            organizations: vec![
                Organization { id: org, name: "Org".into(), active: true },
                Organization { id: foreign_org, name: "Outra".into(), active: true },
            ],
            branches: vec![
                Branch { id: branch, organization_id: org, name: "Centro".into(), location: None },
                Branch { id: foreign_branch, organization_id: foreign_org, name: "Norte".into(), location: None },
            ],
            profiles: vec![
                ProfileRow { user_id: user, organization_id: Some(org), branch_id: Some(branch), role: "member".into() },
                ProfileRow {
                    user_id: foreign_user,
                    organization_id: Some(foreign_org),
                    branch_id: Some(foreign_branch),
                    role: "member".into(),
                },
                ProfileRow { user_id: super_admin, organization_id: None, branch_id: None, role: SUPER_ADMIN_ROLE.into() },
            ],
            categories: vec![category],
            products: vec![p1, p2, pf],
            warehouses: vec![w1, w2, wf],
            ..Tables::default()
        };

        let store = Arc::new(MemoryStore::new(tables));
        let state = AppState::with_store(store.clone(), SECRET.into(), CompensationSettings::new(3, Duration::ZERO));

        Self {
            store,
            state,
            org,
            branch,
            user,
            foreign_user,
            super_admin,
            orphan_user: Uuid::new_v4(),
            category: category_id,
            products,
            warehouses,
            foreign_product,
            foreign_warehouse,
        }
    }

    pub fn ctx(&self) -> TenantContext {
        TenantContext {
            user_id: self.user,
            is_super_admin: false,
            organization_id: Some(self.org),
            branch_id: Some(self.branch),
            organization_name: None,
            branch_name: None,
        }
    }

    pub async fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> i32 {
        self.store
            .snapshot()
            .await
            .product_stocks
            .iter()
            .find(|s| s.product_id == product_id && s.warehouse_id == warehouse_id)
            .map(|s| s.quantity)
            .unwrap_or(0)
    }
}

pub fn token(user: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims { sub: user, exp: (now + 3600) as usize, iat: now as usize };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_ref())).unwrap()
}
