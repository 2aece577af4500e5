// src/services/stock_service.rs

use std::{collections::HashSet, sync::Arc};

use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        scope::{branch_defaults_for, Query, ScopePolicy, Table},
    },
    db::Store,
    models::{
        inventory::{NewStockLevel, ProductStock, SetStockLevelInput, WarehouseValuation},
        tenancy::{ScopeFilter, TenantContext},
    },
    services::{
        invalidation::{Invalidation, View},
        lookup::{require_products, require_warehouses},
    },
};

const STOCK_VIEWS: [View; 3] = [View::Inventory, View::Warehouses, View::Dashboard];

#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn Store>,
    invalidation: Invalidation,
}

impl StockService {
    pub fn new(store: Arc<dyn Store>, invalidation: Invalidation) -> Self {
        Self { store, invalidation }
    }

    pub async fn list(&self, ctx: &TenantContext, filter: &ScopeFilter) -> Result<Vec<ProductStock>, AppError> {
        let query = ScopePolicy::restrict(Query::from(Table::ProductStocks).narrowed_by(filter), ctx)?;
        Ok(self.store.select_stock(&query).await?)
    }

    /// Grava o saldo absoluto (cria o registro se ainda não existir).
    pub async fn set_level(&self, ctx: &TenantContext, input: SetStockLevelInput) -> Result<ProductStock, AppError> {
        input.validate()?;
        let branch = branch_defaults_for(ctx, input.branch_id)?;
        require_products(self.store.as_ref(), ctx, [input.product_id]).await?;
        require_warehouses(self.store.as_ref(), ctx, [input.warehouse_id]).await?;

        let level = NewStockLevel {
            branch,
            product_id: input.product_id,
            warehouse_id: input.warehouse_id,
            quantity: input.quantity,
        };
        // par produto/armazém de outra filial
        let stock = self.store.set_stock(&level).await?.ok_or(AppError::NotFoundInScope("estoque"))?;

        tracing::info!(
            product_id = %stock.product_id,
            warehouse_id = %stock.warehouse_id,
            quantity = stock.quantity,
            "Saldo de estoque definido"
        );
        self.invalidation.notify(&STOCK_VIEWS);
        Ok(stock)
    }

    pub async fn delete_level(&self, ctx: &TenantContext, id: Uuid) -> Result<(), AppError> {
        let query = ScopePolicy::restrict(Query::from(Table::ProductStocks).by_id(id), ctx)?;
        if self.store.delete(&query).await? == 0 {
            return Err(AppError::NotFoundInScope("estoque"));
        }
        tracing::info!(stock_id = %id, "Saldo de estoque excluído");
        self.invalidation.notify(&STOCK_VIEWS);
        Ok(())
    }

    // --- Valorização ---
    pub async fn valuation(&self, ctx: &TenantContext, warehouse_id: Uuid) -> Result<WarehouseValuation, AppError> {
        require_warehouses(self.store.as_ref(), ctx, [warehouse_id]).await?;
        self.store
            .warehouse_valuation(warehouse_id)
            .await?
            .ok_or(AppError::NotFoundInScope("armazém"))
    }

    /// Valorização de todos os armazéns visíveis. O super-admin escolhe a
    /// organização pelo filtro (sem filtro = todas).
    pub async fn valuations(
        &self,
        ctx: &TenantContext,
        filter: &ScopeFilter,
    ) -> Result<Vec<WarehouseValuation>, AppError> {
        let organization_id = if ctx.is_super_admin { filter.organization_id } else { ctx.organization_id };
        let visible: HashSet<Uuid> = self
            .store
            .select_warehouses(&ScopePolicy::restrict(Query::from(Table::Warehouses).narrowed_by(filter), ctx)?)
            .await?
            .into_iter()
            .map(|w| w.id)
            .collect();

        let rows = self.store.warehouse_valuations(organization_id).await?;
        Ok(rows.into_iter().filter(|v| visible.contains(&v.warehouse_id)).collect())
    }
}
