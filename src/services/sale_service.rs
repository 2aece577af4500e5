// src/services/sale_service.rs

use std::{collections::HashMap, sync::Arc};

use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        scope::{branch_defaults_for, Query, ScopePolicy, ScopedQuery, Table},
        validation::{line_amount, quantity_overflow, sum_amounts},
    },
    db::Store,
    models::{
        catalog::Product,
        inventory::{StockDelta, StockKey},
        sales::{
            CreateSaleInput, NewSale, NewSaleItem, Sale, SaleChanges, SaleDetail, SaleItemInput,
            UpdateSaleInput,
        },
        tenancy::{ScopeFilter, TenantContext},
    },
    services::{
        availability::AvailabilityValidator,
        invalidation::{Invalidation, View},
        lookup::{require_exists, require_products, require_warehouses},
        orchestrator::{Compensation, CompensationSettings, Pipeline, Stage},
    },
};

const SALE_VIEWS: [View; 4] = [View::Sales, View::Inventory, View::Warehouses, View::Dashboard];

/// Total e lucro da venda a partir do custo atual de cada produto.
/// O resultado fica gravado na venda e não é recalculado depois.
pub fn compute_totals(
    items: &[SaleItemInput],
    products: &HashMap<Uuid, Product>,
) -> Result<(Decimal, Decimal), AppError> {
    let mut total = Decimal::ZERO;
    let mut profit = Decimal::ZERO;
    for item in items {
        let product = products.get(&item.product_id).ok_or(AppError::NotFoundInScope("produto"))?;
        let revenue = line_amount(item.quantity, item.unit_price)?;
        let cost = line_amount(item.quantity, product.cost_price)?;
        total = sum_amounts([total, revenue])?;
        profit = sum_amounts([profit, revenue - cost])?;
    }
    Ok((total, profit))
}

/// Demanda somada por (produto, armazém), na ordem em que aparece.
pub fn summed_demand(items: &[SaleItemInput]) -> Result<Vec<(Uuid, Uuid, i32)>, AppError> {
    let mut demand: Vec<(Uuid, Uuid, i32)> = Vec::new();
    for item in items {
        match demand
            .iter_mut()
            .find(|(p, w, _)| *p == item.product_id && *w == item.warehouse_id)
        {
            Some((_, _, quantity)) => {
                *quantity = quantity.checked_add(item.quantity).ok_or_else(quantity_overflow)?;
            }
            None => demand.push((item.product_id, item.warehouse_id, item.quantity)),
        }
    }
    Ok(demand)
}

#[derive(Clone)]
pub struct SaleService {
    store: Arc<dyn Store>,
    availability: AvailabilityValidator,
    invalidation: Invalidation,
    settings: CompensationSettings,
}

impl SaleService {
    pub fn new(store: Arc<dyn Store>, invalidation: Invalidation, settings: CompensationSettings) -> Self {
        let availability = AvailabilityValidator::new(store.clone());
        Self { store, availability, invalidation, settings }
    }

    fn scoped(&self, ctx: &TenantContext, id: Uuid) -> Result<ScopedQuery, AppError> {
        ScopePolicy::restrict(Query::from(Table::Sales).by_id(id), ctx)
    }

    // --- CREATE ---
    pub async fn create(&self, ctx: &TenantContext, input: CreateSaleInput) -> Result<SaleDetail, AppError> {
        let mut pipeline = Pipeline::begin("sale.create", self.store.as_ref(), self.settings);

        input.validate()?;
        let branch = branch_defaults_for(ctx, input.branch_id)?;
        if let Some(customer_id) = input.customer_id {
            require_exists(self.store.as_ref(), ctx, Query::from(Table::Customers).by_id(customer_id), "cliente")
                .await?;
        }
        require_warehouses(self.store.as_ref(), ctx, input.items.iter().map(|i| i.warehouse_id)).await?;

        pipeline.advance(Stage::Checking);
        for (product_id, warehouse_id, quantity) in summed_demand(&input.items)? {
            self.availability.check(ctx, product_id, warehouse_id, quantity).await?;
        }

        let products =
            require_products(self.store.as_ref(), ctx, input.items.iter().map(|i| i.product_id)).await?;
        let (total_amount, profit_amount) = compute_totals(&input.items, &products)?;

        let sale = NewSale {
            id: Uuid::new_v4(),
            branch,
            customer_id: input.customer_id,
            user_id: ctx.user_id,
            total_amount,
            profit_amount,
            notes: input.notes,
        };
        let items: Vec<NewSaleItem> = input
            .items
            .iter()
            .map(|i| NewSaleItem {
                sale_id: sale.id,
                branch,
                product_id: i.product_id,
                warehouse_id: i.warehouse_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();
        let deltas: Vec<StockDelta> = items
            .iter()
            .map(|i| {
                let key = StockKey { product_id: i.product_id, warehouse_id: i.warehouse_id, branch_id: branch.branch_id() };
                StockDelta::new(key, -i.quantity)
            })
            .collect();

        let header = self.scoped(ctx, sale.id)?;
        match self.write(&mut pipeline, &sale, &items, deltas, header).await {
            Ok(detail) => {
                pipeline.commit().await?;
                self.committed(&detail.header);
                Ok(detail)
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }

    async fn write(
        &self,
        pipeline: &mut Pipeline<'_>,
        sale: &NewSale,
        items: &[NewSaleItem],
        deltas: Vec<StockDelta>,
        header: ScopedQuery,
    ) -> Result<SaleDetail, AppError> {
        pipeline.advance(Stage::WritingHeader);
        let header_row = pipeline.insert_sale(sale).await?;
        // Itens saem junto (ON DELETE CASCADE)
        pipeline.record(Compensation::DeleteRow { label: "venda", query: header });

        pipeline.advance(Stage::WritingChildren);
        let item_rows = pipeline.insert_sale_items(items).await?;
        pipeline.apply_deltas(deltas).await?;

        Ok(SaleDetail { header: header_row, items: item_rows })
    }

    fn committed(&self, sale: &Sale) {
        tracing::info!(sale_id = %sale.id, branch_id = %sale.branch_id, total = %sale.total_amount, "Venda registrada");
        self.invalidation.notify(&SALE_VIEWS);
    }

    // --- READ ---
    pub async fn get(&self, ctx: &TenantContext, id: Uuid) -> Result<SaleDetail, AppError> {
        let header = self
            .store
            .select_sales(&self.scoped(ctx, id)?.first())
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFoundInScope("venda"))?;

        let items_query = ScopePolicy::restrict(Query::from(Table::SaleItems).eq("sale_id", id), ctx)?;
        let items = self.store.select_sale_items(&items_query).await?;

        Ok(SaleDetail { header, items })
    }

    pub async fn list(&self, ctx: &TenantContext, filter: &ScopeFilter) -> Result<Vec<Sale>, AppError> {
        let query = ScopePolicy::restrict(Query::from(Table::Sales).narrowed_by(filter).newest_first(), ctx)?;
        Ok(self.store.select_sales(&query).await?)
    }

    // --- UPDATE (só metadados) ---
    pub async fn update(&self, ctx: &TenantContext, id: Uuid, input: UpdateSaleInput) -> Result<Sale, AppError> {
        input.validate()?;
        let query = self.scoped(ctx, id)?;
        let current = self
            .store
            .select_sales(&query.clone().first())
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFoundInScope("venda"))?;

        if let Some(Some(customer_id)) = input.customer_id {
            require_exists(self.store.as_ref(), ctx, Query::from(Table::Customers).by_id(customer_id), "cliente")
                .await?;
        }

        let changes = SaleChanges {
            customer_id: input.customer_id.unwrap_or(current.customer_id),
            notes: input.notes.unwrap_or(current.notes),
        };
        let updated = self
            .store
            .update_sale(&query, &changes)
            .await?
            .ok_or(AppError::NotFoundInScope("venda"))?;

        self.invalidation.notify(&[View::Sales, View::Dashboard]);
        Ok(updated)
    }

    // --- DELETE (devolve o estoque) ---
    pub async fn delete(&self, ctx: &TenantContext, id: Uuid) -> Result<(), AppError> {
        let detail = self.get(ctx, id).await?;
        let mut pipeline = Pipeline::begin("sale.delete", self.store.as_ref(), self.settings);
        let header = self.scoped(ctx, id)?;

        let restock: Vec<StockDelta> = detail
            .items
            .iter()
            .map(|i| {
                let key = StockKey { product_id: i.product_id, warehouse_id: i.warehouse_id, branch_id: i.branch_id };
                StockDelta::new(key, i.quantity)
            })
            .collect();

        let result = async {
            pipeline.advance(Stage::WritingChildren);
            pipeline.apply_deltas(restock).await?;
            pipeline.advance(Stage::WritingHeader);
            if pipeline.delete(&header).await? == 0 {
                return Err(AppError::NotFoundInScope("venda"));
            }
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                pipeline.commit().await?;
                tracing::info!(sale_id = %id, "Venda excluída; estoque devolvido");
                self.invalidation.notify(&SALE_VIEWS);
                Ok(())
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::FailPoint, services::testing::World};

    fn line(product_id: Uuid, warehouse_id: Uuid, quantity: i32, unit_price: i64) -> SaleItemInput {
        SaleItemInput { product_id, warehouse_id, quantity, unit_price: Decimal::from(unit_price) }
    }

    fn sale(items: Vec<SaleItemInput>) -> CreateSaleInput {
        CreateSaleInput { customer_id: None, notes: None, items, branch_id: None }
    }

    #[test]
    fn profit_uses_cost_snapshot() {
        let w = World::new();
        let products = w.products_by_id();
        let items = vec![line(w.product_x, w.warehouse_a, 2, 100), line(w.product_y, w.warehouse_a, 1, 50)];

        let (total, profit) = compute_totals(&items, &products).unwrap();

        assert_eq!(total, Decimal::from(250));
        assert_eq!(profit, Decimal::from(80));
    }

    #[test]
    fn demand_is_summed_per_product_and_warehouse() {
        let (p, w1, w2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let items = vec![line(p, w1, 2, 1), line(p, w2, 1, 1), line(p, w1, 3, 1)];

        assert_eq!(summed_demand(&items).unwrap(), vec![(p, w1, 5), (p, w2, 1)]);
    }

    #[test]
    fn demand_beyond_i32_is_a_validation_error() {
        let (p, w) = (Uuid::new_v4(), Uuid::new_v4());
        let items = vec![line(p, w, i32::MAX, 1), line(p, w, i32::MAX, 1)];

        assert!(matches!(summed_demand(&items), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn totals_beyond_the_money_columns_are_refused() {
        let w = World::new();
        let products = w.products_by_id();
        let item = SaleItemInput { product_id: w.product_x, warehouse_id: w.warehouse_a, quantity: 2, unit_price: Decimal::MAX };

        let err = compute_totals(&[item], &products).unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn create_persists_totals_and_decrements_stock() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        w.put_stock(w.product_y, w.warehouse_a, 10).await;
        let service = w.sale_service();

        let detail = service
            .create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 2, 100), line(w.product_y, w.warehouse_a, 1, 50)]))
            .await
            .unwrap();

        assert_eq!(detail.header.total_amount, Decimal::from(250));
        assert_eq!(detail.header.profit_amount, Decimal::from(80));
        assert_eq!(detail.header.branch_id, w.branch_a);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(8));
        assert_eq!(w.quantity(w.product_y, w.warehouse_a).await, Some(9));
    }

    #[tokio::test]
    async fn split_lines_are_checked_against_their_sum() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 3).await;
        let service = w.sale_service();

        let err = service
            .create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 2, 100), line(w.product_x, w.warehouse_a, 2, 100)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientStock { available: 3, requested: 4, .. }));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(3));
        assert!(w.store.snapshot().await.sales.is_empty());
    }

    #[tokio::test]
    async fn child_write_failure_leaves_no_header() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        w.store.inject_failure(FailPoint::InsertSaleItems, 1);
        let service = w.sale_service();

        let err = service.create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 1, 100)])).await.unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        let tables = w.store.snapshot().await;
        assert!(tables.sales.is_empty());
        assert!(tables.sale_items.is_empty());
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(10));
    }

    #[tokio::test]
    async fn stock_failure_restores_and_removes_everything() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        w.store.inject_failure(FailPoint::AdjustStock, 1);
        let service = w.sale_service();

        let err = service.create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 4, 100)])).await.unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        let tables = w.store.snapshot().await;
        assert!(tables.sales.is_empty());
        assert!(tables.sale_items.is_empty());
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(10));
    }

    #[tokio::test]
    async fn failed_compensation_is_reported() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        w.store.inject_failure(FailPoint::InsertSaleItems, 1);
        w.store.inject_failure(FailPoint::Delete, 10);
        let service = w.sale_service();

        let err = service.create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 1, 100)])).await.unwrap_err();

        let AppError::CompensationFailure { source, pending } = err else {
            panic!("esperava CompensationFailure");
        };
        assert!(matches!(*source, AppError::Store(_)));
        assert_eq!(pending.len(), 1);
        // o cabeçalho órfão continua lá: é a anomalia reportada
        assert_eq!(w.store.snapshot().await.sales.len(), 1);
    }

    #[tokio::test]
    async fn foreign_sale_looks_like_a_missing_one() {
        let w = World::new();
        w.put_stock(w.product_b, w.warehouse_b, 5).await;
        let service = w.sale_service();
        let foreign = service.create(&w.ctx_b(), sale(vec![line(w.product_b, w.warehouse_b, 1, 10)])).await.unwrap();

        let ctx = w.ctx_a();
        let missing = Uuid::new_v4();
        for id in [foreign.header.id, missing] {
            assert!(matches!(service.get(&ctx, id).await, Err(AppError::NotFoundInScope("venda"))));
            assert!(matches!(service.delete(&ctx, id).await, Err(AppError::NotFoundInScope("venda"))));
            let update = UpdateSaleInput { customer_id: None, notes: Some(Some("x".into())) };
            assert!(matches!(service.update(&ctx, id, update).await, Err(AppError::NotFoundInScope("venda"))));
        }
        assert_eq!(w.quantity(w.product_b, w.warehouse_b).await, Some(4));
    }

    #[tokio::test]
    async fn super_admin_lists_and_writes_the_requested_branch() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 5).await;
        w.put_stock(w.product_b, w.warehouse_b, 5).await;
        let service = w.sale_service();
        service.create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 1, 100)])).await.unwrap();

        let mut input = sale(vec![line(w.product_b, w.warehouse_b, 2, 10)]);
        input.branch_id = Some(w.branch_b);
        let written = service.create(&w.admin(), input).await.unwrap();
        assert_eq!(written.header.branch_id, w.branch_b);

        let filter = ScopeFilter { organization_id: None, branch_id: Some(w.branch_b) };
        let listed = service.list(&w.admin(), &filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].branch_id, w.branch_b);

        // o mesmo filtro não amplia o escopo de um usuário comum
        assert!(service.list(&w.ctx_a(), &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn regular_user_cannot_write_into_another_branch() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 5).await;
        let mut input = sale(vec![line(w.product_x, w.warehouse_a, 1, 100)]);
        input.branch_id = Some(w.branch_b);

        let err = w.sale_service().create(&w.ctx_a(), input).await.unwrap_err();

        assert!(matches!(err, AppError::NotFoundInScope(_)));
    }

    #[tokio::test]
    async fn delete_restores_stock_and_update_keeps_structure() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 5).await;
        let service = w.sale_service();
        let ctx = w.ctx_a();
        let created = service.create(&ctx, sale(vec![line(w.product_x, w.warehouse_a, 3, 100)])).await.unwrap();

        let updated = service
            .update(
                &ctx,
                created.header.id,
                UpdateSaleInput { customer_id: Some(Some(w.customer_a)), notes: Some(Some("troca".into())) },
            )
            .await
            .unwrap();
        assert_eq!(updated.customer_id, Some(w.customer_a));
        assert_eq!(updated.total_amount, created.header.total_amount);

        service.delete(&ctx, created.header.id).await.unwrap();

        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(5));
        let tables = w.store.snapshot().await;
        assert!(tables.sales.is_empty());
        assert!(tables.sale_items.is_empty());
    }

    #[tokio::test]
    async fn empty_or_invalid_lines_fail_before_writing() {
        let w = World::new();
        let service = w.sale_service();

        let err = service.create(&w.ctx_a(), sale(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = service.create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 0, 100)])).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        assert!(w.store.snapshot().await.sales.is_empty());
    }

    #[tokio::test]
    async fn success_notifies_stale_views() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 5).await;
        let mut rx = w.invalidation.subscribe();

        w.sale_service().create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 1, 100)])).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(event.views.contains(&View::Sales));
        assert!(event.views.contains(&View::Inventory));
    }

    #[tokio::test]
    async fn oversized_lines_never_touch_stock() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        let service = w.sale_service();
        let lines = vec![line(w.product_x, w.warehouse_a, i32::MAX, 1), line(w.product_x, w.warehouse_a, i32::MAX, 1)];

        let err = service.create(&w.ctx_a(), sale(lines)).await.unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(10));
        assert!(w.store.snapshot().await.sales.is_empty());
    }

    #[tokio::test]
    async fn price_beyond_the_limit_is_rejected() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        let item = SaleItemInput { product_id: w.product_x, warehouse_id: w.warehouse_a, quantity: 2, unit_price: Decimal::MAX };

        let err = w.sale_service().create(&w.ctx_a(), sale(vec![item])).await.unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(10));
    }

    #[tokio::test]
    async fn explicit_null_clears_customer_and_absent_keeps_it() {
        let w = World::new();
        w.put_stock(w.product_x, w.warehouse_a, 5).await;
        let service = w.sale_service();
        let ctx = w.ctx_a();
        let mut input = sale(vec![line(w.product_x, w.warehouse_a, 1, 100)]);
        input.customer_id = Some(w.customer_a);
        input.notes = Some("balcão".into());
        let created = service.create(&ctx, input).await.unwrap();

        let kept = service
            .update(&ctx, created.header.id, UpdateSaleInput { customer_id: None, notes: Some(Some("troca".into())) })
            .await
            .unwrap();
        assert_eq!(kept.customer_id, Some(w.customer_a));
        assert_eq!(kept.notes.as_deref(), Some("troca"));

        let cleared = service
            .update(&ctx, created.header.id, UpdateSaleInput { customer_id: Some(None), notes: Some(None) })
            .await
            .unwrap();
        assert_eq!(cleared.customer_id, None);
        assert_eq!(cleared.notes, None);
    }

    #[tokio::test]
    async fn transactional_store_rolls_back_without_compensating() {
        let w = World::transactional();
        w.put_stock(w.product_x, w.warehouse_a, 10).await;
        w.store.inject_failure(FailPoint::InsertSaleItems, 1);
        // o rollback não passa por exclusões
        w.store.inject_failure(FailPoint::Delete, 10);
        let service = w.sale_service();

        let err = service.create(&w.ctx_a(), sale(vec![line(w.product_x, w.warehouse_a, 1, 100)])).await.unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        let tables = w.store.snapshot().await;
        assert!(tables.sales.is_empty());
        assert!(tables.sale_items.is_empty());
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(10));
    }

    #[tokio::test]
    async fn transactional_delete_restocks_in_one_commit() {
        let w = World::transactional();
        w.put_stock(w.product_x, w.warehouse_a, 5).await;
        let service = w.sale_service();
        let ctx = w.ctx_a();
        let created = service.create(&ctx, sale(vec![line(w.product_x, w.warehouse_a, 3, 100)])).await.unwrap();
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(2));

        service.delete(&ctx, created.header.id).await.unwrap();

        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(5));
        assert!(w.store.snapshot().await.sales.is_empty());
    }
}
