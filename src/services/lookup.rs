// src/services/lookup.rs
//
// Leituras de referência usadas pelos pipelines antes de qualquer escrita.
// Tudo passa pelo ScopePolicy: o que está fora do escopo "não existe".

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        scope::{Query, ScopePolicy, Table},
    },
    db::Store,
    models::{catalog::Product, tenancy::TenantContext},
};

pub async fn require_exists(
    store: &dyn Store,
    ctx: &TenantContext,
    query: Query,
    what: &'static str,
) -> Result<(), AppError> {
    let scoped = ScopePolicy::restrict(query, ctx)?.first();
    if store.exists(&scoped).await? {
        Ok(())
    } else {
        Err(AppError::NotFoundInScope(what))
    }
}

fn distinct(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Todos os armazéns precisam estar visíveis (próprios ou compartilhados).
pub async fn require_warehouses(
    store: &dyn Store,
    ctx: &TenantContext,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<(), AppError> {
    let ids = distinct(ids);
    if ids.is_empty() {
        return Ok(());
    }
    let expected = ids.len();
    let scoped = ScopePolicy::restrict(Query::from(Table::Warehouses).any_of("id", ids), ctx)?;
    let visible = store.select_warehouses(&scoped).await?;
    if visible.len() < expected {
        return Err(AppError::NotFoundInScope("armazém"));
    }
    Ok(())
}

/// Busca em lote dos produtos da organização. Falta de qualquer um = 404.
pub async fn require_products(
    store: &dyn Store,
    ctx: &TenantContext,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, Product>, AppError> {
    let ids = distinct(ids);
    let expected = ids.len();
    let scoped = ScopePolicy::restrict(Query::from(Table::Products).any_of("id", ids), ctx)?;
    let products: HashMap<Uuid, Product> = store
        .select_products(&scoped)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    if products.len() < expected {
        return Err(AppError::NotFoundInScope("produto"));
    }
    Ok(products)
}
