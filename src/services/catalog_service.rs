// src/services/catalog_service.rs
//
// Exclusões de cadastro protegidas por dependentes.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        scope::{Query, ScopePolicy, ScopedQuery, Table},
    },
    db::{Store, StoreError},
    models::tenancy::TenantContext,
    services::invalidation::{Invalidation, View},
};

/// Sonda de existência (LIMIT 1). Qualquer dependente visível bloqueia.
pub async fn guard_delete(store: &dyn Store, dependents: ScopedQuery, reason: &str) -> Result<(), AppError> {
    if store.exists(&dependents.first()).await? {
        return Err(AppError::Blocked(reason.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    invalidation: Invalidation,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, invalidation: Invalidation) -> Self {
        Self { store, invalidation }
    }

    async fn guarded_delete(
        &self,
        target: ScopedQuery,
        what: &'static str,
        dependents: ScopedQuery,
        reason: &str,
    ) -> Result<(), AppError> {
        if !self.store.exists(&target.clone().first()).await? {
            return Err(AppError::NotFoundInScope(what));
        }
        guard_delete(self.store.as_ref(), dependents, reason).await?;

        // dependentes fora do escopo do chamador só aparecem na chave estrangeira
        match self.store.delete(&target).await {
            Ok(0) => Err(AppError::NotFoundInScope(what)),
            Ok(_) => Ok(()),
            Err(StoreError::ForeignKeyViolation(constraint)) => {
                tracing::warn!(%constraint, "Exclusão barrada pelo banco");
                Err(AppError::Blocked(reason.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_category(&self, ctx: &TenantContext, id: Uuid) -> Result<(), AppError> {
        let target = ScopePolicy::restrict(Query::from(Table::Categories).by_id(id), ctx)?;
        let dependents = ScopePolicy::restrict(Query::from(Table::Products).eq("category_id", id), ctx)?;

        self.guarded_delete(target, "categoria", dependents, "A categoria possui produtos vinculados.")
            .await?;

        tracing::info!(category_id = %id, "Categoria excluída");
        self.invalidation.notify(&[View::Categories]);
        Ok(())
    }

    pub async fn delete_warehouse(&self, ctx: &TenantContext, id: Uuid) -> Result<(), AppError> {
        let target = ScopePolicy::restrict(Query::from(Table::Warehouses).by_id(id), ctx)?;
        let dependents = ScopePolicy::restrict(Query::from(Table::ProductStocks).eq("warehouse_id", id), ctx)?;

        self.guarded_delete(target, "armazém", dependents, "O armazém possui saldos de estoque.")
            .await?;

        tracing::info!(warehouse_id = %id, "Armazém excluído");
        self.invalidation.notify(&[View::Warehouses, View::Inventory]);
        Ok(())
    }
}
