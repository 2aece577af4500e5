// src/db/memory_store.rs
//
// Store em memória: tabelas em `RwLock`, carga inicial por JSON e injeção de
// falhas para exercitar a compensação. Por padrão não abre transações e o
// núcleo grava com compensação; `transactional()` liga transações sobre uma
// cópia de trabalho das tabelas.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::{
    common::scope::{Filter, ScopedQuery, Table},
    db::store::{Store, StoreError, StoreTransaction},
    models::{
        catalog::{Category, Party, Product, Warehouse},
        inventory::{
            MovementChanges, NewStockLevel, NewStockMovement, ProductStock, StockAdjustment,
            StockDelta, StockMovement, WarehouseValuation,
        },
        purchasing::{
            NewPurchaseOrder, NewPurchaseOrderItem, PurchaseItemChanges, PurchaseOrder,
            PurchaseOrderItem,
        },
        sales::{NewSale, NewSaleItem, Sale, SaleChanges, SaleItem},
        tenancy::{Branch, Organization, UserProfile},
    },
};

// Linha da tabela `profiles` (sem os nomes do JOIN)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub role: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tables {
    pub organizations: Vec<Organization>,
    pub branches: Vec<Branch>,
    pub profiles: Vec<ProfileRow>,
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
    pub warehouses: Vec<Warehouse>,
    pub customers: Vec<Party>,
    pub suppliers: Vec<Party>,
    pub product_stocks: Vec<ProductStock>,
    pub sales: Vec<Sale>,
    pub sale_items: Vec<SaleItem>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub purchase_order_items: Vec<PurchaseOrderItem>,
    pub stock_movements: Vec<StockMovement>,
}

/// Pontos onde uma falha pode ser forçada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FindProfile,
    Select,
    Delete,
    AdjustStock,
    SetStock,
    InsertSale,
    InsertSaleItems,
    UpdateSale,
    InsertPurchaseOrder,
    InsertPurchaseItems,
    UpdatePurchaseItem,
    UpdatePurchaseTotal,
    InsertMovement,
    UpdateMovement,
}

#[derive(Clone, Default)]
struct Failures(Arc<Mutex<HashMap<FailPoint, u32>>>);

impl Failures {
    fn inject(&self, point: FailPoint, times: u32) {
        if let Ok(mut failures) = self.0.lock() {
            failures.insert(point, times);
        }
    }

    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut failures = self
            .0
            .lock()
            .map_err(|_| StoreError::Unavailable("registro de falhas envenenado".into()))?;
        if let Some(remaining) = failures.get_mut(&point) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable(format!("falha injetada em {:?}", point)));
            }
        }
        Ok(())
    }
}

pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    failures: Failures,
    transactional: bool,
}

impl MemoryStore {
    pub fn new(tables: Tables) -> Self {
        Self { tables: Arc::new(RwLock::new(tables)), failures: Failures::default(), transactional: false }
    }

    /// Liga o suporte a transações: `begin` segura a escrita das tabelas até
    /// o commit ou o rollback.
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&raw)?)
    }

    /// As próximas `times` chamadas que passam por `point` falham.
    pub fn inject_failure(&self, point: FailPoint, times: u32) {
        self.failures.inject(point, times);
    }

    /// Cópia das tabelas, para asserções em testes.
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }

    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        self.failures.trip(point)
    }

    async fn select<R, F>(&self, query: &ScopedQuery, rows: F) -> Result<Vec<R>, StoreError>
    where
        R: Record + Clone,
        F: FnOnce(&Tables) -> &Vec<R>,
    {
        self.trip(FailPoint::Select)?;
        let tables = self.tables.read().await;
        Ok(select(rows(&tables), query))
    }
}

// ---
// Filtros sobre as linhas
// ---
trait Record {
    /// Valor de uma coluna UUID (`None` = nula ou inexistente).
    fn column(&self, name: &str) -> Option<Uuid>;

    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl Record for Category {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "organization_id" => Some(self.organization_id),
            _ => None,
        }
    }
}

impl Record for Product {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "organization_id" => Some(self.organization_id),
            "category_id" => self.category_id,
            _ => None,
        }
    }
}

impl Record for Warehouse {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "organization_id" => Some(self.organization_id),
            "branch_id" => self.branch_id,
            _ => None,
        }
    }
}

impl Record for Party {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "organization_id" => Some(self.organization_id),
            _ => None,
        }
    }
}

impl Record for ProductStock {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "product_id" => Some(self.product_id),
            "warehouse_id" => Some(self.warehouse_id),
            "branch_id" => Some(self.branch_id),
            _ => None,
        }
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

impl Record for Sale {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "branch_id" => Some(self.branch_id),
            "customer_id" => self.customer_id,
            "user_id" => Some(self.user_id),
            _ => None,
        }
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Record for SaleItem {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "sale_id" => Some(self.sale_id),
            "branch_id" => Some(self.branch_id),
            "product_id" => Some(self.product_id),
            "warehouse_id" => Some(self.warehouse_id),
            _ => None,
        }
    }
}

impl Record for PurchaseOrder {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "branch_id" => Some(self.branch_id),
            "supplier_id" => self.supplier_id,
            "user_id" => Some(self.user_id),
            _ => None,
        }
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Record for PurchaseOrderItem {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "purchase_order_id" => Some(self.purchase_order_id),
            "branch_id" => Some(self.branch_id),
            "product_id" => Some(self.product_id),
            "warehouse_id" => Some(self.warehouse_id),
            _ => None,
        }
    }
}

impl Record for StockMovement {
    fn column(&self, name: &str) -> Option<Uuid> {
        match name {
            "id" => Some(self.id),
            "branch_id" => Some(self.branch_id),
            "product_id" => Some(self.product_id),
            "from_warehouse_id" => self.from_warehouse_id,
            "to_warehouse_id" => self.to_warehouse_id,
            "created_by" => Some(self.created_by),
            _ => None,
        }
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

fn matches<R: Record>(row: &R, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, value) => row.column(column) == Some(*value),
        Filter::EqOrNull(column, value) => row.column(column).is_none_or(|v| v == *value),
        Filter::In(column, values) => row.column(column).is_some_and(|v| values.contains(&v)),
    })
}

fn select<R: Record + Clone>(rows: &[R], query: &ScopedQuery) -> Vec<R> {
    let mut found: Vec<R> = rows.iter().filter(|r| matches(*r, query.filters())).cloned().collect();
    if query.is_newest_first() {
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    }
    if let Some(limit) = query.limit() {
        found.truncate(usize::try_from(limit).unwrap_or(0));
    }
    found
}

fn count<R: Record>(rows: &[R], filters: &[Filter]) -> usize {
    rows.iter().filter(|r| matches(*r, filters)).count()
}

fn remove<R: Record>(rows: &mut Vec<R>, filters: &[Filter]) -> Vec<Uuid> {
    let mut removed = Vec::new();
    rows.retain(|row| {
        if matches(row, filters) {
            removed.extend(row.column("id"));
            false
        } else {
            true
        }
    });
    removed
}

fn referenced<R: Record>(rows: &[R], column: &str, ids: &[Uuid]) -> bool {
    rows.iter().any(|r| r.column(column).is_some_and(|v| ids.contains(&v)))
}

fn ids_matching<R: Record>(rows: &[R], filters: &[Filter]) -> Vec<Uuid> {
    rows.iter()
        .filter(|r| matches(*r, filters))
        .filter_map(|r| r.column("id"))
        .collect()
}

impl Tables {
    fn count(&self, query: &ScopedQuery) -> usize {
        let filters = query.filters();
        match query.table() {
            Table::Categories => count(&self.categories, filters),
            Table::Products => count(&self.products, filters),
            Table::Warehouses => count(&self.warehouses, filters),
            Table::Customers => count(&self.customers, filters),
            Table::Suppliers => count(&self.suppliers, filters),
            Table::ProductStocks => count(&self.product_stocks, filters),
            Table::Sales => count(&self.sales, filters),
            Table::SaleItems => count(&self.sale_items, filters),
            Table::PurchaseOrders => count(&self.purchase_orders, filters),
            Table::PurchaseOrderItems => count(&self.purchase_order_items, filters),
            Table::StockMovements => count(&self.stock_movements, filters),
        }
    }

    // Mesmas restrições de chave estrangeira do esquema do PostgreSQL
    fn check_references(&self, query: &ScopedQuery) -> Result<(), StoreError> {
        let filters = query.filters();
        let violation = match query.table() {
            Table::Categories => {
                let ids = ids_matching(&self.categories, filters);
                referenced(&self.products, "category_id", &ids).then_some("products_category_id_fkey")
            }
            Table::Products => {
                let ids = ids_matching(&self.products, filters);
                (referenced(&self.product_stocks, "product_id", &ids)
                    || referenced(&self.sale_items, "product_id", &ids)
                    || referenced(&self.purchase_order_items, "product_id", &ids)
                    || referenced(&self.stock_movements, "product_id", &ids))
                .then_some("product_stocks_product_id_fkey")
            }
            Table::Warehouses => {
                let ids = ids_matching(&self.warehouses, filters);
                (referenced(&self.product_stocks, "warehouse_id", &ids)
                    || referenced(&self.sale_items, "warehouse_id", &ids)
                    || referenced(&self.purchase_order_items, "warehouse_id", &ids)
                    || referenced(&self.stock_movements, "from_warehouse_id", &ids)
                    || referenced(&self.stock_movements, "to_warehouse_id", &ids))
                .then_some("product_stocks_warehouse_id_fkey")
            }
            _ => None,
        };
        match violation {
            Some(constraint) => Err(StoreError::ForeignKeyViolation(constraint.to_string())),
            None => Ok(()),
        }
    }

    fn delete(&mut self, query: &ScopedQuery) -> Result<u64, StoreError> {
        self.check_references(query)?;
        let filters = query.filters();
        let removed = match query.table() {
            Table::Categories => remove(&mut self.categories, filters),
            Table::Products => remove(&mut self.products, filters),
            Table::Warehouses => remove(&mut self.warehouses, filters),
            Table::Customers => remove(&mut self.customers, filters),
            Table::Suppliers => remove(&mut self.suppliers, filters),
            Table::ProductStocks => remove(&mut self.product_stocks, filters),
            Table::Sales => {
                let removed = remove(&mut self.sales, filters);
                // ON DELETE CASCADE
                self.sale_items.retain(|i| !removed.contains(&i.sale_id));
                removed
            }
            Table::SaleItems => remove(&mut self.sale_items, filters),
            Table::PurchaseOrders => {
                let removed = remove(&mut self.purchase_orders, filters);
                self.purchase_order_items.retain(|i| !removed.contains(&i.purchase_order_id));
                removed
            }
            Table::PurchaseOrderItems => remove(&mut self.purchase_order_items, filters),
            Table::StockMovements => remove(&mut self.stock_movements, filters),
        };
        Ok(removed.len() as u64)
    }

    fn valuation(&self, warehouse: &Warehouse) -> WarehouseValuation {
        let mut total_cost = Decimal::ZERO;
        let mut total_revenue = Decimal::ZERO;
        for stock in self.product_stocks.iter().filter(|s| s.warehouse_id == warehouse.id) {
            if let Some(product) = self.products.iter().find(|p| p.id == stock.product_id) {
                let quantity = Decimal::from(stock.quantity);
                total_cost += quantity * product.cost_price;
                total_revenue += quantity * product.selling_price;
            }
        }
        WarehouseValuation {
            warehouse_id: warehouse.id,
            warehouse_name: warehouse.name.clone(),
            total_cost,
            total_revenue,
            projected_profit: total_revenue - total_cost,
        }
    }

    fn adjust_stock(&mut self, delta: &StockDelta) -> Result<StockAdjustment, StoreError> {
        let key = delta.key;
        let existing = self
            .product_stocks
            .iter_mut()
            .find(|s| s.product_id == key.product_id && s.warehouse_id == key.warehouse_id);

        match existing {
            Some(stock) if stock.branch_id != key.branch_id => Ok(StockAdjustment::OutOfScope),
            Some(stock) => {
                let next = stock
                    .quantity
                    .checked_add(delta.delta)
                    .ok_or_else(|| StoreError::Unavailable("estouro no saldo".into()))?;
                if next < 0 {
                    return Ok(StockAdjustment::Insufficient { available: stock.quantity });
                }
                stock.quantity = next;
                stock.updated_at = Utc::now();
                Ok(StockAdjustment::Applied { quantity: next })
            }
            None if delta.delta >= 0 => {
                self.product_stocks.push(ProductStock {
                    id: Uuid::new_v4(),
                    product_id: key.product_id,
                    warehouse_id: key.warehouse_id,
                    branch_id: key.branch_id,
                    quantity: delta.delta,
                    updated_at: Utc::now(),
                });
                Ok(StockAdjustment::Applied { quantity: delta.delta })
            }
            None => Ok(StockAdjustment::Insufficient { available: 0 }),
        }
    }

    fn set_stock(&mut self, level: &NewStockLevel) -> Option<ProductStock> {
        let branch_id = level.branch.branch_id();
        let existing = self
            .product_stocks
            .iter_mut()
            .find(|s| s.product_id == level.product_id && s.warehouse_id == level.warehouse_id);

        match existing {
            Some(stock) if stock.branch_id != branch_id => None,
            Some(stock) => {
                stock.quantity = level.quantity;
                stock.updated_at = Utc::now();
                Some(stock.clone())
            }
            None => {
                let stock = ProductStock {
                    id: Uuid::new_v4(),
                    product_id: level.product_id,
                    warehouse_id: level.warehouse_id,
                    branch_id,
                    quantity: level.quantity,
                    updated_at: Utc::now(),
                };
                self.product_stocks.push(stock.clone());
                Some(stock)
            }
        }
    }

    fn insert_sale(&mut self, sale: &NewSale) -> Sale {
        let row = Sale {
            id: sale.id,
            branch_id: sale.branch.branch_id(),
            customer_id: sale.customer_id,
            user_id: sale.user_id,
            total_amount: sale.total_amount,
            profit_amount: sale.profit_amount,
            notes: sale.notes.clone(),
            created_at: Utc::now(),
        };
        self.sales.push(row.clone());
        row
    }

    fn insert_sale_items(&mut self, items: &[NewSaleItem]) -> Vec<SaleItem> {
        let rows: Vec<SaleItem> = items
            .iter()
            .map(|item| SaleItem {
                id: Uuid::new_v4(),
                sale_id: item.sale_id,
                branch_id: item.branch.branch_id(),
                product_id: item.product_id,
                warehouse_id: item.warehouse_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        self.sale_items.extend(rows.iter().cloned());
        rows
    }

    fn update_sale(&mut self, query: &ScopedQuery, changes: &SaleChanges) -> Option<Sale> {
        first_match(&mut self.sales, query).map(|sale| {
            sale.customer_id = changes.customer_id;
            sale.notes = changes.notes.clone();
            sale.clone()
        })
    }

    fn insert_purchase_order(&mut self, order: &NewPurchaseOrder) -> PurchaseOrder {
        let row = PurchaseOrder {
            id: order.id,
            branch_id: order.branch.branch_id(),
            supplier_id: order.supplier_id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            notes: order.notes.clone(),
            created_at: Utc::now(),
        };
        self.purchase_orders.push(row.clone());
        row
    }

    fn insert_purchase_items(&mut self, items: &[NewPurchaseOrderItem]) -> Vec<PurchaseOrderItem> {
        let rows: Vec<PurchaseOrderItem> = items
            .iter()
            .map(|item| PurchaseOrderItem {
                id: Uuid::new_v4(),
                purchase_order_id: item.purchase_order_id,
                branch_id: item.branch.branch_id(),
                product_id: item.product_id,
                warehouse_id: item.warehouse_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
            .collect();
        self.purchase_order_items.extend(rows.iter().cloned());
        rows
    }

    fn update_purchase_item(
        &mut self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Option<PurchaseOrderItem> {
        first_match(&mut self.purchase_order_items, query).map(|item| {
            item.warehouse_id = changes.warehouse_id;
            item.quantity = changes.quantity;
            item.unit_price = changes.unit_price;
            item.total_price = changes.total_price();
            item.clone()
        })
    }

    fn update_purchase_total(&mut self, query: &ScopedQuery, total_amount: Decimal) -> Option<PurchaseOrder> {
        first_match(&mut self.purchase_orders, query).map(|order| {
            order.total_amount = total_amount;
            order.clone()
        })
    }

    fn insert_movement(&mut self, movement: &NewStockMovement) -> StockMovement {
        let changes = &movement.changes;
        let row = StockMovement {
            id: Uuid::new_v4(),
            branch_id: movement.branch.branch_id(),
            product_id: changes.product_id,
            from_warehouse_id: changes.from_warehouse_id,
            to_warehouse_id: changes.to_warehouse_id,
            quantity: changes.quantity,
            notes: changes.notes.clone(),
            created_by: movement.created_by,
            created_at: Utc::now(),
        };
        self.stock_movements.push(row.clone());
        row
    }

    fn update_movement(&mut self, query: &ScopedQuery, changes: &MovementChanges) -> Option<StockMovement> {
        first_match(&mut self.stock_movements, query).map(|movement| {
            movement.product_id = changes.product_id;
            movement.from_warehouse_id = changes.from_warehouse_id;
            movement.to_warehouse_id = changes.to_warehouse_id;
            movement.quantity = changes.quantity;
            movement.notes = changes.notes.clone();
            movement.clone()
        })
    }
}

fn first_match<'a, R: Record>(rows: &'a mut [R], query: &ScopedQuery) -> Option<&'a mut R> {
    rows.iter_mut().find(|r| matches(&**r, query.filters()))
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        self.trip(FailPoint::FindProfile)?;
        let tables = self.tables.read().await;
        let Some(row) = tables.profiles.iter().find(|p| p.user_id == user_id) else {
            return Ok(None);
        };
        let organization = row
            .organization_id
            .and_then(|id| tables.organizations.iter().find(|o| o.id == id));
        let branch = row.branch_id.and_then(|id| tables.branches.iter().find(|b| b.id == id));
        Ok(Some(UserProfile {
            user_id: row.user_id,
            organization_id: row.organization_id,
            branch_id: row.branch_id,
            role: row.role.clone(),
            organization_name: organization.map(|o| o.name.clone()),
            organization_active: organization.map(|o| o.active),
            branch_name: branch.map(|b| b.name.clone()),
        }))
    }

    async fn exists(&self, query: &ScopedQuery) -> Result<bool, StoreError> {
        self.trip(FailPoint::Select)?;
        let tables = self.tables.read().await;
        Ok(tables.count(query) > 0)
    }

    async fn delete(&self, query: &ScopedQuery) -> Result<u64, StoreError> {
        self.trip(FailPoint::Delete)?;
        let mut tables = self.tables.write().await;
        tables.delete(query)
    }

    async fn select_products(&self, query: &ScopedQuery) -> Result<Vec<Product>, StoreError> {
        self.select(query, |t| &t.products).await
    }

    async fn select_warehouses(&self, query: &ScopedQuery) -> Result<Vec<Warehouse>, StoreError> {
        self.select(query, |t| &t.warehouses).await
    }

    async fn select_stock(&self, query: &ScopedQuery) -> Result<Vec<ProductStock>, StoreError> {
        self.select(query, |t| &t.product_stocks).await
    }

    async fn adjust_stock(&self, delta: &StockDelta) -> Result<StockAdjustment, StoreError> {
        self.trip(FailPoint::AdjustStock)?;
        self.tables.write().await.adjust_stock(delta)
    }

    async fn set_stock(&self, level: &NewStockLevel) -> Result<Option<ProductStock>, StoreError> {
        self.trip(FailPoint::SetStock)?;
        Ok(self.tables.write().await.set_stock(level))
    }

    async fn warehouse_valuation(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Option<WarehouseValuation>, StoreError> {
        self.trip(FailPoint::Select)?;
        let tables = self.tables.read().await;
        Ok(tables
            .warehouses
            .iter()
            .find(|w| w.id == warehouse_id)
            .map(|w| tables.valuation(w)))
    }

    async fn warehouse_valuations(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<WarehouseValuation>, StoreError> {
        self.trip(FailPoint::Select)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<WarehouseValuation> = tables
            .warehouses
            .iter()
            .filter(|w| organization_id.is_none_or(|org| w.organization_id == org))
            .map(|w| tables.valuation(w))
            .collect();
        rows.sort_by(|a, b| a.warehouse_name.cmp(&b.warehouse_name));
        Ok(rows)
    }

    async fn select_sales(&self, query: &ScopedQuery) -> Result<Vec<Sale>, StoreError> {
        self.select(query, |t| &t.sales).await
    }

    async fn select_sale_items(&self, query: &ScopedQuery) -> Result<Vec<SaleItem>, StoreError> {
        self.select(query, |t| &t.sale_items).await
    }

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError> {
        self.trip(FailPoint::InsertSale)?;
        Ok(self.tables.write().await.insert_sale(sale))
    }

    async fn insert_sale_items(&self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError> {
        self.trip(FailPoint::InsertSaleItems)?;
        Ok(self.tables.write().await.insert_sale_items(items))
    }

    async fn update_sale(
        &self,
        query: &ScopedQuery,
        changes: &SaleChanges,
    ) -> Result<Option<Sale>, StoreError> {
        self.trip(FailPoint::UpdateSale)?;
        Ok(self.tables.write().await.update_sale(query, changes))
    }

    async fn select_purchase_orders(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<PurchaseOrder>, StoreError> {
        self.select(query, |t| &t.purchase_orders).await
    }

    async fn select_purchase_items(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        self.select(query, |t| &t.purchase_order_items).await
    }

    async fn insert_purchase_order(
        &self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError> {
        self.trip(FailPoint::InsertPurchaseOrder)?;
        Ok(self.tables.write().await.insert_purchase_order(order))
    }

    async fn insert_purchase_items(
        &self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        self.trip(FailPoint::InsertPurchaseItems)?;
        Ok(self.tables.write().await.insert_purchase_items(items))
    }

    async fn update_purchase_item(
        &self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError> {
        self.trip(FailPoint::UpdatePurchaseItem)?;
        Ok(self.tables.write().await.update_purchase_item(query, changes))
    }

    async fn update_purchase_total(
        &self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        self.trip(FailPoint::UpdatePurchaseTotal)?;
        Ok(self.tables.write().await.update_purchase_total(query, total_amount))
    }

    async fn select_movements(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<StockMovement>, StoreError> {
        self.select(query, |t| &t.stock_movements).await
    }

    async fn insert_movement(
        &self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError> {
        self.trip(FailPoint::InsertMovement)?;
        Ok(self.tables.write().await.insert_movement(movement))
    }

    async fn update_movement(
        &self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError> {
        self.trip(FailPoint::UpdateMovement)?;
        Ok(self.tables.write().await.update_movement(query, changes))
    }

    async fn begin(&self) -> Result<Option<Box<dyn StoreTransaction>>, StoreError> {
        if !self.transactional {
            return Ok(None);
        }
        let guard = self.tables.clone().write_owned().await;
        let working = guard.clone();
        Ok(Some(Box::new(MemoryTransaction { guard: Some(guard), working, failures: self.failures.clone() })))
    }
}

/// Segura a escrita das tabelas e grava numa cópia; `commit` troca a cópia
/// pelas tabelas, e descartar a transação não deixa rastro.
struct MemoryTransaction {
    guard: Option<OwnedRwLockWriteGuard<Tables>>,
    working: Tables,
    failures: Failures,
}

impl MemoryTransaction {
    fn tables(&mut self, point: FailPoint) -> Result<&mut Tables, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Unavailable("transação já encerrada".into()));
        }
        self.failures.trip(point)?;
        Ok(&mut self.working)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn delete(&mut self, query: &ScopedQuery) -> Result<u64, StoreError> {
        self.tables(FailPoint::Delete)?.delete(query)
    }

    async fn adjust_stock(&mut self, delta: &StockDelta) -> Result<StockAdjustment, StoreError> {
        self.tables(FailPoint::AdjustStock)?.adjust_stock(delta)
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale, StoreError> {
        Ok(self.tables(FailPoint::InsertSale)?.insert_sale(sale))
    }

    async fn insert_sale_items(&mut self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError> {
        Ok(self.tables(FailPoint::InsertSaleItems)?.insert_sale_items(items))
    }

    async fn insert_purchase_order(
        &mut self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError> {
        Ok(self.tables(FailPoint::InsertPurchaseOrder)?.insert_purchase_order(order))
    }

    async fn insert_purchase_items(
        &mut self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        Ok(self.tables(FailPoint::InsertPurchaseItems)?.insert_purchase_items(items))
    }

    async fn update_purchase_item(
        &mut self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError> {
        Ok(self.tables(FailPoint::UpdatePurchaseItem)?.update_purchase_item(query, changes))
    }

    async fn update_purchase_total(
        &mut self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.tables(FailPoint::UpdatePurchaseTotal)?.update_purchase_total(query, total_amount))
    }

    async fn insert_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError> {
        Ok(self.tables(FailPoint::InsertMovement)?.insert_movement(movement))
    }

    async fn update_movement(
        &mut self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError> {
        Ok(self.tables(FailPoint::UpdateMovement)?.update_movement(query, changes))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Unavailable("transação já encerrada".into()))?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard = None;
        self.working = Tables::default();
        Ok(())
    }
}
