// src/services/movement_service.rs
//
// Movimentações de estoque: entrada (só destino), saída (só origem) ou
// transferência. O efeito sobre os saldos é sempre origem -q, destino +q.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        scope::{branch_defaults_for, Query, ScopePolicy, ScopedQuery, Table},
        validation::invalid_field,
    },
    db::Store,
    models::{
        inventory::{
            movement_effect, MovementChanges, MovementInput, NewStockMovement, StockDelta, StockMovement,
            WarehouseSelection,
        },
        tenancy::{ScopeFilter, TenantContext},
    },
    services::{
        availability::AvailabilityValidator,
        invalidation::{Invalidation, View},
        lookup::{require_products, require_warehouses},
        orchestrator::{Compensation, CompensationSettings, Pipeline, Stage},
    },
};

const MOVEMENT_VIEWS: [View; 3] = [View::Movements, View::Inventory, View::Warehouses];

fn warehouse_field(
    selection: Option<&WarehouseSelection>,
    field: &'static str,
) -> Result<Option<Uuid>, AppError> {
    match selection {
        None => Ok(None),
        Some(selection) => selection
            .normalize()
            .map_err(|_| invalid_field(field, "invalid_warehouse", "Armazém inválido.")),
    }
}

/// Normaliza o payload (sentinela "none" vira ausência) e aplica as regras
/// entre campos.
pub fn movement_changes(input: &MovementInput) -> Result<MovementChanges, AppError> {
    let from = warehouse_field(input.from_warehouse_id.as_ref(), "fromWarehouseId")?;
    let to = warehouse_field(input.to_warehouse_id.as_ref(), "toWarehouseId")?;

    match (from, to) {
        (None, None) => {
            return Err(invalid_field(
                "toWarehouseId",
                "missing_warehouse",
                "Informe o armazém de origem ou de destino.",
            ));
        }
        (Some(a), Some(b)) if a == b => {
            return Err(invalid_field(
                "toWarehouseId",
                "same_warehouse",
                "Origem e destino devem ser armazéns diferentes.",
            ));
        }
        _ => {}
    }

    Ok(MovementChanges {
        product_id: input.product_id,
        from_warehouse_id: from,
        to_warehouse_id: to,
        quantity: input.quantity,
        notes: input.notes.clone(),
    })
}

#[derive(Clone)]
pub struct MovementService {
    store: Arc<dyn Store>,
    availability: AvailabilityValidator,
    invalidation: Invalidation,
    settings: CompensationSettings,
}

impl MovementService {
    pub fn new(store: Arc<dyn Store>, invalidation: Invalidation, settings: CompensationSettings) -> Self {
        let availability = AvailabilityValidator::new(store.clone());
        Self { store, availability, invalidation, settings }
    }

    fn scoped(&self, ctx: &TenantContext, id: Uuid) -> Result<ScopedQuery, AppError> {
        ScopePolicy::restrict(Query::from(Table::StockMovements).by_id(id), ctx)
    }

    async fn references(&self, ctx: &TenantContext, changes: &MovementChanges) -> Result<(), AppError> {
        require_products(self.store.as_ref(), ctx, [changes.product_id]).await?;
        let warehouses = changes.from_warehouse_id.into_iter().chain(changes.to_warehouse_id);
        require_warehouses(self.store.as_ref(), ctx, warehouses).await
    }

    // --- CREATE ---
    pub async fn create(&self, ctx: &TenantContext, input: MovementInput) -> Result<StockMovement, AppError> {
        let mut pipeline = Pipeline::begin("movement.create", self.store.as_ref(), self.settings);

        input.validate()?;
        let changes = movement_changes(&input)?;
        let branch = branch_defaults_for(ctx, input.branch_id)?;
        self.references(ctx, &changes).await?;

        pipeline.advance(Stage::Checking);
        if let Some(from) = changes.from_warehouse_id {
            self.availability.check(ctx, changes.product_id, from, changes.quantity).await?;
        }

        let movement = NewStockMovement { branch, created_by: ctx.user_id, changes };
        let result = async {
            pipeline.advance(Stage::WritingHeader);
            let row = pipeline.insert_movement(&movement).await?;
            pipeline.record(Compensation::DeleteRow { label: "movimentação", query: self.scoped(ctx, row.id)? });

            pipeline.advance(Stage::WritingChildren);
            pipeline.apply_deltas(row.effect()).await?;
            Ok::<StockMovement, AppError>(row)
        }
        .await;

        match result {
            Ok(row) => {
                pipeline.commit().await?;
                tracing::info!(movement_id = %row.id, product_id = %row.product_id, quantity = row.quantity, "Movimentação registrada");
                self.invalidation.notify(&MOVEMENT_VIEWS);
                Ok(row)
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }

    // --- READ ---
    pub async fn get(&self, ctx: &TenantContext, id: Uuid) -> Result<StockMovement, AppError> {
        self.store
            .select_movements(&self.scoped(ctx, id)?.first())
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFoundInScope("movimentação"))
    }

    pub async fn list(&self, ctx: &TenantContext, filter: &ScopeFilter) -> Result<Vec<StockMovement>, AppError> {
        let query = ScopePolicy::restrict(Query::from(Table::StockMovements).narrowed_by(filter).newest_first(), ctx)?;
        Ok(self.store.select_movements(&query).await?)
    }

    // --- UPDATE (completo) ---
    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        input: MovementInput,
    ) -> Result<StockMovement, AppError> {
        input.validate()?;
        let changes = movement_changes(&input)?;
        let old = self.get(ctx, id).await?;
        self.references(ctx, &changes).await?;

        let mut pipeline = Pipeline::begin("movement.update", self.store.as_ref(), self.settings);
        pipeline.advance(Stage::Checking);
        self.availability.check_movement_update(ctx, &old, &changes).await?;

        // desfaz o efeito antigo e aplica o novo, somados por saldo
        let deltas: Vec<StockDelta> = old
            .effect()
            .iter()
            .map(StockDelta::inverse)
            .chain(movement_effect(old.branch_id, &changes))
            .collect();
        let query = self.scoped(ctx, id)?;

        let result = async {
            pipeline.advance(Stage::WritingHeader);
            let row = pipeline
                .update_movement(&query, &changes)
                .await?
                .ok_or(AppError::NotFoundInScope("movimentação"))?;
            pipeline.record(Compensation::RestoreMovement { query: query.clone(), changes: old.changes() });

            pipeline.advance(Stage::WritingChildren);
            pipeline.apply_deltas(deltas).await?;
            Ok::<StockMovement, AppError>(row)
        }
        .await;

        match result {
            Ok(row) => {
                pipeline.commit().await?;
                tracing::info!(movement_id = %id, "Movimentação alterada");
                self.invalidation.notify(&MOVEMENT_VIEWS);
                Ok(row)
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }

    // --- DELETE (reverte o efeito no estoque) ---
    pub async fn delete(&self, ctx: &TenantContext, id: Uuid) -> Result<(), AppError> {
        let old = self.get(ctx, id).await?;

        let mut pipeline = Pipeline::begin("movement.delete", self.store.as_ref(), self.settings);
        pipeline.advance(Stage::Checking);
        // o que entrou no destino precisa continuar lá para sair
        if let Some(to) = old.to_warehouse_id {
            self.availability.check(ctx, old.product_id, to, old.quantity).await?;
        }
        let reversal: Vec<StockDelta> = old.effect().iter().map(StockDelta::inverse).collect();
        let query = self.scoped(ctx, id)?;

        let result = async {
            pipeline.advance(Stage::WritingChildren);
            pipeline.apply_deltas(reversal).await?;
            pipeline.advance(Stage::WritingHeader);
            if pipeline.delete(&query).await? == 0 {
                return Err(AppError::NotFoundInScope("movimentação"));
            }
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                pipeline.commit().await?;
                tracing::info!(movement_id = %id, "Movimentação excluída; estoque revertido");
                self.invalidation.notify(&MOVEMENT_VIEWS);
                Ok(())
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }
}
