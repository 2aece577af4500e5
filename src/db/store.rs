// src/db/store.rs
//
// Fronteira com o banco. Leituras, atualizações e exclusões só aceitam
// `ScopedQuery`; inserções só aceitam linhas `New*`, que carregam os valores
// padrão do tenant.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    common::scope::ScopedQuery,
    models::{
        catalog::{Product, Warehouse},
        inventory::{
            MovementChanges, NewStockLevel, NewStockMovement, ProductStock, StockAdjustment,
            StockDelta, StockMovement, WarehouseValuation,
        },
        purchasing::{
            NewPurchaseOrder, NewPurchaseOrderItem, PurchaseItemChanges, PurchaseOrder,
            PurchaseOrderItem,
        },
        sales::{NewSale, NewSaleItem, Sale, SaleChanges, SaleItem},
        tenancy::UserProfile,
    },
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Erro de banco de dados: {0}")]
    Database(#[from] sqlx::Error),

    // Exclusão barrada por uma chave estrangeira (constraint no texto)
    #[error("Violação de chave estrangeira: {0}")]
    ForeignKeyViolation(String),

    #[error("Store indisponível: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Tenancy ---
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;

    // --- Genéricos ---
    async fn exists(&self, query: &ScopedQuery) -> Result<bool, StoreError>;

    /// Devolve o número de linhas removidas (0 = nada no escopo).
    async fn delete(&self, query: &ScopedQuery) -> Result<u64, StoreError>;

    // --- Catálogo ---
    async fn select_products(&self, query: &ScopedQuery) -> Result<Vec<Product>, StoreError>;

    async fn select_warehouses(&self, query: &ScopedQuery) -> Result<Vec<Warehouse>, StoreError>;

    // --- Estoque ---
    async fn select_stock(&self, query: &ScopedQuery) -> Result<Vec<ProductStock>, StoreError>;

    /// Ajuste condicional: só aplica se o saldo resultante não ficar negativo.
    /// Entradas criam o saldo quando ele ainda não existe.
    async fn adjust_stock(&self, delta: &StockDelta) -> Result<StockAdjustment, StoreError>;

    /// Grava o saldo absoluto. `None` quando o par produto/armazém já pertence
    /// a outra filial.
    async fn set_stock(&self, level: &NewStockLevel) -> Result<Option<ProductStock>, StoreError>;

    async fn warehouse_valuation(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Option<WarehouseValuation>, StoreError>;

    async fn warehouse_valuations(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<WarehouseValuation>, StoreError>;

    // --- Vendas ---
    async fn select_sales(&self, query: &ScopedQuery) -> Result<Vec<Sale>, StoreError>;

    async fn select_sale_items(&self, query: &ScopedQuery) -> Result<Vec<SaleItem>, StoreError>;

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError>;

    async fn insert_sale_items(&self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError>;

    async fn update_sale(
        &self,
        query: &ScopedQuery,
        changes: &SaleChanges,
    ) -> Result<Option<Sale>, StoreError>;

    // --- Compras ---
    async fn select_purchase_orders(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<PurchaseOrder>, StoreError>;

    async fn select_purchase_items(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError>;

    async fn insert_purchase_order(
        &self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError>;

    async fn insert_purchase_items(
        &self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError>;

    async fn update_purchase_item(
        &self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError>;

    async fn update_purchase_total(
        &self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    // --- Movimentações ---
    async fn select_movements(&self, query: &ScopedQuery)
        -> Result<Vec<StockMovement>, StoreError>;

    async fn insert_movement(
        &self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError>;

    async fn update_movement(
        &self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError>;

    // --- Transações (opcionais) ---

    /// Abre uma transação para as escritas de uma operação. `Ok(None)` =
    /// sem suporte; o núcleo grava direto e desfaz por compensação.
    async fn begin(&self) -> Result<Option<Box<dyn StoreTransaction>>, StoreError> {
        Ok(None)
    }
}

/// Escritas de uma transação aberta por `Store::begin`. Nada fica visível
/// antes de `commit`; descartar sem `commit` equivale a `rollback`.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    async fn delete(&mut self, query: &ScopedQuery) -> Result<u64, StoreError>;

    async fn adjust_stock(&mut self, delta: &StockDelta) -> Result<StockAdjustment, StoreError>;

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale, StoreError>;

    async fn insert_sale_items(&mut self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError>;

    async fn insert_purchase_order(
        &mut self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError>;

    async fn insert_purchase_items(
        &mut self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError>;

    async fn update_purchase_item(
        &mut self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError>;

    async fn update_purchase_total(
        &mut self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    async fn insert_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError>;

    async fn update_movement(
        &mut self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}
