// src/services/availability.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        scope::{Query, ScopePolicy, Table},
    },
    db::Store,
    models::{
        inventory::{MovementChanges, StockMovement},
        tenancy::TenantContext,
    },
};

/// Quantidade que pode sair da origem de uma movimentação editada.
///
/// A quantidade antiga só é devolvida quando a origem e o produto continuam
/// os mesmos: o que saiu de W1 não vale como saldo de W2.
pub fn effective_availability(
    current: i32,
    old: &StockMovement,
    new_product: Uuid,
    new_from: Option<Uuid>,
) -> i32 {
    let released = if old.from_warehouse_id.is_some()
        && old.from_warehouse_id == new_from
        && old.product_id == new_product
    {
        old.quantity
    } else {
        0
    };
    current.saturating_add(released)
}

#[derive(Clone)]
pub struct AvailabilityValidator {
    store: Arc<dyn Store>,
}

impl AvailabilityValidator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Saldo visível do par produto/armazém (0 se não houver registro).
    pub async fn current(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<i32, AppError> {
        let query = Query::from(Table::ProductStocks)
            .eq("product_id", product_id)
            .eq("warehouse_id", warehouse_id);
        let scoped = ScopePolicy::restrict(query, ctx)?.first();
        let rows = self.store.select_stock(&scoped).await?;
        Ok(rows.first().map(|s| s.quantity).unwrap_or(0))
    }

    pub async fn check(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
        warehouse_id: Uuid,
        requested: i32,
    ) -> Result<(), AppError> {
        let available = self.current(ctx, product_id, warehouse_id).await?;
        if available < requested {
            tracing::debug!(%product_id, %warehouse_id, available, requested, "Estoque insuficiente");
            return Err(AppError::InsufficientStock { product_id, warehouse_id, available, requested });
        }
        Ok(())
    }

    /// Regra de crédito na edição de uma movimentação. Sem origem nova não há
    /// o que verificar.
    pub async fn check_movement_update(
        &self,
        ctx: &TenantContext,
        old: &StockMovement,
        new: &MovementChanges,
    ) -> Result<(), AppError> {
        let Some(from) = new.from_warehouse_id else {
            return Ok(());
        };

        let current = self.current(ctx, new.product_id, from).await?;
        let available = effective_availability(current, old, new.product_id, Some(from));
        if available < new.quantity {
            return Err(AppError::InsufficientStock {
                product_id: new.product_id,
                warehouse_id: from,
                available,
                requested: new.quantity,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn movement(product_id: Uuid, from: Option<Uuid>, quantity: i32) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            product_id,
            from_warehouse_id: from,
            to_warehouse_id: None,
            quantity,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn same_source_gets_the_old_quantity_back() {
        let (p, w1) = (Uuid::new_v4(), Uuid::new_v4());
        let old = movement(p, Some(w1), 5);

        assert_eq!(effective_availability(10, &old, p, Some(w1)), 15);
    }

    #[test]
    fn other_source_or_product_gets_no_credit() {
        let (p, w1, w2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let old = movement(p, Some(w1), 5);

        assert_eq!(effective_availability(10, &old, p, Some(w2)), 10);
        assert_eq!(effective_availability(10, &old, Uuid::new_v4(), Some(w1)), 10);
    }

    #[test]
    fn inbound_movement_releases_nothing() {
        let p = Uuid::new_v4();
        let old = movement(p, None, 5);

        assert_eq!(effective_availability(3, &old, p, None), 3);
    }
}
