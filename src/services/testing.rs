// src/services/testing.rs
//
// Cenário de dois tenants sobre o MemoryStore, compartilhado pelos testes dos
// serviços. `transactional()` monta o mesmo cenário com transações ligadas.

use std::{collections::HashMap, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::scope::branch_defaults_for,
    db::{
        memory_store::{ProfileRow, Tables},
        MemoryStore, Store,
    },
    models::{
        catalog::{Category, Party, Product, Warehouse},
        inventory::NewStockLevel,
        tenancy::{Branch, Organization, TenantContext, SUPER_ADMIN_ROLE},
    },
    services::{
        catalog_service::CatalogService, invalidation::Invalidation, movement_service::MovementService,
        orchestrator::CompensationSettings, purchase_service::PurchaseService, sale_service::SaleService,
        stock_service::StockService,
    },
};

pub struct World {
    pub store: Arc<MemoryStore>,
    pub invalidation: Invalidation,
    pub products: Vec<Product>,
    pub org_a: Uuid,
    pub org_b: Uuid,
    pub branch_a: Uuid,
    pub branch_b: Uuid,
    pub warehouse_a: Uuid,
    pub warehouse_a2: Uuid,
    pub warehouse_shared: Uuid,
    pub warehouse_b: Uuid,
    pub category_a: Uuid,
    /// Custo 60, venda 100.
    pub product_x: Uuid,
    /// Custo 50, venda 70.
    pub product_y: Uuid,
    pub product_b: Uuid,
    pub customer_a: Uuid,
    pub supplier_a: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub super_admin: Uuid,
}

fn product(organization_id: Uuid, category_id: Option<Uuid>, name: &str, cost: i64, price: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        organization_id,
        category_id,
        name: name.into(),
        barcode: None,
        cost_price: Decimal::from(cost),
        selling_price: Decimal::from(price),
    }
}

fn warehouse(organization_id: Uuid, branch_id: Option<Uuid>, name: &str) -> Warehouse {
    Warehouse { id: Uuid::new_v4(), organization_id, branch_id, name: name.into(), location: None }
}

impl World {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn transactional() -> Self {
        Self::build(true)
    }

    fn build(transactional: bool) -> Self {
        let (org_a, org_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (branch_a, branch_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (user_a, user_b, super_admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let category = Category { id: Uuid::new_v4(), organization_id: org_a, name: "Bebidas".into() };
        let x = product(org_a, Some(category.id), "Café", 60, 100);
        let y = product(org_a, None, "Chá", 50, 70);
        let b = product(org_b, None, "Suco", 5, 10);
        let wa = warehouse(org_a, Some(branch_a), "Depósito A");
        let wa2 = warehouse(org_a, Some(branch_a), "Loja A");
        let ws = warehouse(org_a, None, "Central");
        let wb = warehouse(org_b, Some(branch_b), "Depósito B");
        let customer = Party { id: Uuid::new_v4(), organization_id: org_a, name: "Cliente A".into() };
        let supplier = Party { id: Uuid::new_v4(), organization_id: org_a, name: "Fornecedor A".into() };

        let profile = |user_id, organization_id, branch_id, role: &str| ProfileRow {
            user_id,
            organization_id,
            branch_id,
            role: role.into(),
        };

        let ids = (category.id, x.id, y.id, b.id, wa.id, wa2.id, ws.id, wb.id, customer.id, supplier.id);
        let products = vec![x, y, b];

        let tables = Tables {
            organizations: vec![
                Organization { id: org_a, name: "Org A".into(), active: true },
                Organization { id: org_b, name: "Org B".into(), active: true },
            ],
            branches: vec![
                Branch { id: branch_a, organization_id: org_a, name: "Filial A".into(), location: None },
                Branch { id: branch_b, organization_id: org_b, name: "Filial B".into(), location: None },
            ],
            profiles: vec![
                profile(user_a, Some(org_a), Some(branch_a), "member"),
                profile(user_b, Some(org_b), Some(branch_b), "member"),
                profile(super_admin, None, None, SUPER_ADMIN_ROLE),
            ],
            categories: vec![category],
            products: products.clone(),
            warehouses: vec![wa, wa2, ws, wb],
            customers: vec![customer],
            suppliers: vec![supplier],
            ..Tables::default()
        };

        let store = MemoryStore::new(tables);
        let store = if transactional { store.transactional() } else { store };

        let (category_a, product_x, product_y, product_b, warehouse_a, warehouse_a2, warehouse_shared, warehouse_b, customer_a, supplier_a) = ids;
        Self {
            store: Arc::new(store),
            invalidation: Invalidation::default(),
            products,
            org_a,
            org_b,
            branch_a,
            branch_b,
            warehouse_a,
            warehouse_a2,
            warehouse_shared,
            warehouse_b,
            category_a,
            product_x,
            product_y,
            product_b,
            customer_a,
            supplier_a,
            user_a,
            user_b,
            super_admin,
        }
    }

    pub fn ctx_a(&self) -> TenantContext {
        self.member(self.user_a, self.org_a, self.branch_a)
    }

    pub fn ctx_b(&self) -> TenantContext {
        self.member(self.user_b, self.org_b, self.branch_b)
    }

    pub fn admin(&self) -> TenantContext {
        TenantContext {
            user_id: self.super_admin,
            is_super_admin: true,
            organization_id: None,
            branch_id: None,
            organization_name: None,
            branch_name: None,
        }
    }

    fn member(&self, user_id: Uuid, org: Uuid, branch: Uuid) -> TenantContext {
        TenantContext {
            user_id,
            is_super_admin: false,
            organization_id: Some(org),
            branch_id: Some(branch),
            organization_name: None,
            branch_name: None,
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn settings(&self) -> CompensationSettings {
        CompensationSettings::new(3, Duration::ZERO)
    }

    pub fn sale_service(&self) -> SaleService {
        SaleService::new(self.dyn_store(), self.invalidation.clone(), self.settings())
    }

    pub fn purchase_service(&self) -> PurchaseService {
        PurchaseService::new(self.dyn_store(), self.invalidation.clone(), self.settings())
    }

    pub fn movement_service(&self) -> MovementService {
        MovementService::new(self.dyn_store(), self.invalidation.clone(), self.settings())
    }

    pub fn stock_service(&self) -> StockService {
        StockService::new(self.dyn_store(), self.invalidation.clone())
    }

    pub fn catalog_service(&self) -> CatalogService {
        CatalogService::new(self.dyn_store(), self.invalidation.clone())
    }

    pub fn products_by_id(&self) -> HashMap<Uuid, Product> {
        self.products.iter().map(|p| (p.id, p.clone())).collect()
    }

    /// Grava o saldo direto no store, na filial dona do armazém.
    pub async fn put_stock(&self, product_id: Uuid, warehouse_id: Uuid, quantity: i32) {
        let branch = self.branch_of(warehouse_id).await;
        let level = NewStockLevel {
            branch: branch_defaults_for(&self.admin(), Some(branch)).unwrap(),
            product_id,
            warehouse_id,
            quantity,
        };
        self.store.set_stock(&level).await.unwrap().unwrap();
    }

    pub async fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> Option<i32> {
        self.store
            .snapshot()
            .await
            .product_stocks
            .iter()
            .find(|s| s.product_id == product_id && s.warehouse_id == warehouse_id)
            .map(|s| s.quantity)
    }

    async fn branch_of(&self, warehouse_id: Uuid) -> Uuid {
        let tables = self.store.snapshot().await;
        tables
            .warehouses
            .iter()
            .find(|w| w.id == warehouse_id)
            .and_then(|w| w.branch_id)
            .unwrap_or(self.branch_a)
    }
}
