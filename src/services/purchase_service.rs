// src/services/purchase_service.rs

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        scope::{branch_defaults_for, Query, ScopePolicy, ScopedQuery, Table},
        validation::{line_amount, sum_amounts},
    },
    db::Store,
    models::{
        inventory::{StockDelta, StockKey},
        purchasing::{
            CreatePurchaseOrderInput, NewPurchaseOrder, NewPurchaseOrderItem, PurchaseItemChanges,
            PurchaseOrder, PurchaseOrderDetail, PurchaseOrderItem, UpdatePurchaseItemInput,
        },
        tenancy::{ScopeFilter, TenantContext},
    },
    services::{
        invalidation::{Invalidation, View},
        lookup::{require_exists, require_products, require_warehouses},
        orchestrator::{Compensation, CompensationSettings, Pipeline, Stage},
    },
};

const PURCHASE_VIEWS: [View; 4] = [View::Purchases, View::Inventory, View::Warehouses, View::Dashboard];

fn item_key(item: &PurchaseOrderItem, warehouse_id: Uuid) -> StockKey {
    StockKey { product_id: item.product_id, warehouse_id, branch_id: item.branch_id }
}

/// Grava o total do cabeçalho; o anterior fica registrado para a compensação.
async fn write_total(
    pipeline: &mut Pipeline<'_>,
    header: ScopedQuery,
    total: Decimal,
    previous: Decimal,
) -> Result<PurchaseOrder, AppError> {
    let updated = pipeline
        .update_purchase_total(&header, total)
        .await?
        .ok_or(AppError::NotFoundInScope("pedido de compra"))?;
    pipeline.record(Compensation::RestorePurchaseTotal { query: header, total_amount: previous });
    Ok(updated)
}

#[derive(Clone)]
pub struct PurchaseService {
    store: Arc<dyn Store>,
    invalidation: Invalidation,
    settings: CompensationSettings,
}

impl PurchaseService {
    pub fn new(store: Arc<dyn Store>, invalidation: Invalidation, settings: CompensationSettings) -> Self {
        Self { store, invalidation, settings }
    }

    fn scoped(&self, ctx: &TenantContext, id: Uuid) -> Result<ScopedQuery, AppError> {
        ScopePolicy::restrict(Query::from(Table::PurchaseOrders).by_id(id), ctx)
    }

    fn scoped_item(&self, ctx: &TenantContext, order_id: Uuid, item_id: Uuid) -> Result<ScopedQuery, AppError> {
        let query = Query::from(Table::PurchaseOrderItems).by_id(item_id).eq("purchase_order_id", order_id);
        ScopePolicy::restrict(query, ctx)
    }

    // --- CREATE (entrada de mercadoria, sem checagem de saldo) ---
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: CreatePurchaseOrderInput,
    ) -> Result<PurchaseOrderDetail, AppError> {
        let mut pipeline = Pipeline::begin("purchase.create", self.store.as_ref(), self.settings);

        input.validate()?;
        let branch = branch_defaults_for(ctx, input.branch_id)?;
        if let Some(supplier_id) = input.supplier_id {
            require_exists(self.store.as_ref(), ctx, Query::from(Table::Suppliers).by_id(supplier_id), "fornecedor")
                .await?;
        }
        require_warehouses(self.store.as_ref(), ctx, input.items.iter().map(|i| i.warehouse_id)).await?;
        require_products(self.store.as_ref(), ctx, input.items.iter().map(|i| i.product_id)).await?;

        pipeline.advance(Stage::Checking);
        let order = NewPurchaseOrder {
            id: Uuid::new_v4(),
            branch,
            supplier_id: input.supplier_id,
            user_id: ctx.user_id,
            total_amount: Decimal::ZERO,
            notes: input.notes,
        };
        let items = input
            .items
            .iter()
            .map(|i| {
                Ok(NewPurchaseOrderItem {
                    purchase_order_id: order.id,
                    branch,
                    product_id: i.product_id,
                    warehouse_id: i.warehouse_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    total_price: line_amount(i.quantity, i.unit_price)?,
                })
            })
            .collect::<Result<Vec<NewPurchaseOrderItem>, AppError>>()?;
        let total_amount = sum_amounts(items.iter().map(|i| i.total_price))?;
        let order = NewPurchaseOrder { total_amount, ..order };
        let deltas: Vec<StockDelta> = items
            .iter()
            .map(|i| {
                let key = StockKey { product_id: i.product_id, warehouse_id: i.warehouse_id, branch_id: branch.branch_id() };
                StockDelta::new(key, i.quantity)
            })
            .collect();

        let header = self.scoped(ctx, order.id)?;
        match self.write(&mut pipeline, &order, &items, deltas, header).await {
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
        order: &NewPurchaseOrder,
        items: &[NewPurchaseOrderItem],
        deltas: Vec<StockDelta>,
        header: ScopedQuery,
    ) -> Result<PurchaseOrderDetail, AppError> {
        pipeline.advance(Stage::WritingHeader);
        let header_row = pipeline.insert_purchase_order(order).await?;
        pipeline.record(Compensation::DeleteRow { label: "pedido de compra", query: header });

        pipeline.advance(Stage::WritingChildren);
        let item_rows = pipeline.insert_purchase_items(items).await?;
        pipeline.apply_deltas(deltas).await?;

        Ok(PurchaseOrderDetail { header: header_row, items: item_rows })
    }

    fn committed(&self, order: &PurchaseOrder) {
        tracing::info!(
            purchase_order_id = %order.id,
            branch_id = %order.branch_id,
            total = %order.total_amount,
            "Pedido de compra registrado"
        );
        self.invalidation.notify(&PURCHASE_VIEWS);
    }

    // --- READ ---
    async fn header(&self, ctx: &TenantContext, id: Uuid) -> Result<PurchaseOrder, AppError> {
        self.store
            .select_purchase_orders(&self.scoped(ctx, id)?.first())
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFoundInScope("pedido de compra"))
    }

    async fn items(&self, ctx: &TenantContext, order_id: Uuid) -> Result<Vec<PurchaseOrderItem>, AppError> {
        let query = ScopePolicy::restrict(Query::from(Table::PurchaseOrderItems).eq("purchase_order_id", order_id), ctx)?;
        Ok(self.store.select_purchase_items(&query).await?)
    }

    pub async fn get(&self, ctx: &TenantContext, id: Uuid) -> Result<PurchaseOrderDetail, AppError> {
        let header = self.header(ctx, id).await?;
        let items = self.items(ctx, id).await?;
        Ok(PurchaseOrderDetail { header, items })
    }

    pub async fn list(&self, ctx: &TenantContext, filter: &ScopeFilter) -> Result<Vec<PurchaseOrder>, AppError> {
        let query = ScopePolicy::restrict(Query::from(Table::PurchaseOrders).narrowed_by(filter).newest_first(), ctx)?;
        Ok(self.store.select_purchase_orders(&query).await?)
    }

    // --- DELETE (retira o que entrou; bloqueado se já foi consumido) ---
    pub async fn delete(&self, ctx: &TenantContext, id: Uuid) -> Result<(), AppError> {
        let detail = self.get(ctx, id).await?;
        let mut pipeline = Pipeline::begin("purchase.delete", self.store.as_ref(), self.settings);
        let header = self.scoped(ctx, id)?;

        let removal: Vec<StockDelta> = detail
            .items
            .iter()
            .map(|i| StockDelta::new(item_key(i, i.warehouse_id), -i.quantity))
            .collect();

        let result = async {
            pipeline.advance(Stage::WritingChildren);
            pipeline.apply_deltas(removal).await?;
            pipeline.advance(Stage::WritingHeader);
            if pipeline.delete(&header).await? == 0 {
                return Err(AppError::NotFoundInScope("pedido de compra"));
            }
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                pipeline.commit().await?;
                tracing::info!(purchase_order_id = %id, "Pedido de compra excluído; estoque retirado");
                self.invalidation.notify(&PURCHASE_VIEWS);
                Ok(())
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }

    // --- ITENS ---
    async fn item(&self, ctx: &TenantContext, order_id: Uuid, item_id: Uuid) -> Result<PurchaseOrderItem, AppError> {
        self.store
            .select_purchase_items(&self.scoped_item(ctx, order_id, item_id)?.first())
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFoundInScope("item do pedido"))
    }

    pub async fn update_item(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
        item_id: Uuid,
        input: UpdatePurchaseItemInput,
    ) -> Result<PurchaseOrderDetail, AppError> {
        input.validate()?;
        let order = self.header(ctx, order_id).await?;
        let current = self.item(ctx, order_id, item_id).await?;
        if let Some(warehouse_id) = input.warehouse_id {
            require_warehouses(self.store.as_ref(), ctx, [warehouse_id]).await?;
        }

        let before = current.changes();
        let after = PurchaseItemChanges {
            warehouse_id: input.warehouse_id.unwrap_or(before.warehouse_id),
            quantity: input.quantity.unwrap_or(before.quantity),
            unit_price: input.unit_price.unwrap_or(before.unit_price),
        };
        let deltas = vec![
            StockDelta::new(item_key(&current, before.warehouse_id), -before.quantity),
            StockDelta::new(item_key(&current, after.warehouse_id), after.quantity),
        ];
        // novo total calculado antes de gravar: nenhuma leitura durante a escrita
        let line_total = line_amount(after.quantity, after.unit_price)?;
        let siblings = self.items(ctx, order_id).await?;
        let total = sum_amounts(
            siblings
                .iter()
                .map(|i| if i.id == item_id { line_total } else { i.total_price }),
        )?;

        let mut pipeline = Pipeline::begin("purchase.update_item", self.store.as_ref(), self.settings);
        pipeline.advance(Stage::Checking);
        let header = self.scoped(ctx, order_id)?;
        let query = self.scoped_item(ctx, order_id, item_id)?;

        let result = async {
            pipeline.advance(Stage::WritingChildren);
            pipeline.apply_deltas(deltas).await?;
            pipeline
                .update_purchase_item(&query, &after)
                .await?
                .ok_or(AppError::NotFoundInScope("item do pedido"))?;
            pipeline.record(Compensation::RestorePurchaseItem { query: query.clone(), changes: before });

            pipeline.advance(Stage::WritingHeader);
            write_total(&mut pipeline, header, total, order.total_amount).await
        }
        .await;

        match result {
            Ok(header) => {
                pipeline.commit().await?;
                tracing::info!(purchase_order_id = %order_id, item_id = %item_id, "Item do pedido de compra alterado");
                self.invalidation.notify(&PURCHASE_VIEWS);
                let items = self.items(ctx, order_id).await?;
                Ok(PurchaseOrderDetail { header, items })
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }

    pub async fn delete_item(&self, ctx: &TenantContext, order_id: Uuid, item_id: Uuid) -> Result<(), AppError> {
        let order = self.header(ctx, order_id).await?;
        let current = self.item(ctx, order_id, item_id).await?;
        let remaining = sum_amounts(
            self.items(ctx, order_id)
                .await?
                .iter()
                .filter(|i| i.id != item_id)
                .map(|i| i.total_price),
        )?;

        let mut pipeline = Pipeline::begin("purchase.delete_item", self.store.as_ref(), self.settings);
        pipeline.advance(Stage::Checking);
        let header = self.scoped(ctx, order_id)?;
        let query = self.scoped_item(ctx, order_id, item_id)?;

        let result = async {
            pipeline.advance(Stage::WritingChildren);
            pipeline
                .apply_deltas([StockDelta::new(item_key(&current, current.warehouse_id), -current.quantity)])
                .await?;

            pipeline.advance(Stage::WritingHeader);
            write_total(&mut pipeline, header, remaining, order.total_amount).await?;

            // exclusão por último: não há como recriar o item com o mesmo id
            if pipeline.delete(&query).await? == 0 {
                return Err(AppError::NotFoundInScope("item do pedido"));
            }
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                pipeline.commit().await?;
                tracing::info!(purchase_order_id = %order_id, item_id = %item_id, "Item do pedido de compra excluído");
                self.invalidation.notify(&PURCHASE_VIEWS);
                Ok(())
            }
            Err(e) => Err(pipeline.fail(e).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::FailPoint,
        models::{
            purchasing::PurchaseItemInput,
            sales::{CreateSaleInput, SaleItemInput},
        },
        services::testing::World,
    };

    fn line(product_id: Uuid, warehouse_id: Uuid, quantity: i32, unit_price: i64) -> PurchaseItemInput {
        PurchaseItemInput { product_id, warehouse_id, quantity, unit_price: Decimal::from(unit_price) }
    }

    fn order(items: Vec<PurchaseItemInput>) -> CreatePurchaseOrderInput {
        CreatePurchaseOrderInput { supplier_id: None, notes: None, items, branch_id: None }
    }

    #[tokio::test]
    async fn create_sums_totals_and_receives_stock() {
        let w = World::new();
        let service = w.purchase_service();
        let mut input = order(vec![line(w.product_x, w.warehouse_a, 10, 12), line(w.product_y, w.warehouse_shared, 4, 5)]);
        input.supplier_id = Some(w.supplier_a);

        let detail = service.create(&w.ctx_a(), input).await.unwrap();

        assert_eq!(detail.header.total_amount, Decimal::from(140));
        assert_eq!(detail.items[0].total_price, Decimal::from(120));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(10));
        assert_eq!(w.quantity(w.product_y, w.warehouse_shared).await, Some(4));
    }

    #[tokio::test]
    async fn foreign_warehouse_or_product_is_not_found() {
        let w = World::new();
        let service = w.purchase_service();

        let err = service.create(&w.ctx_a(), order(vec![line(w.product_x, w.warehouse_b, 1, 1)])).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundInScope("armazém")));

        let err = service.create(&w.ctx_a(), order(vec![line(w.product_b, w.warehouse_a, 1, 1)])).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundInScope("produto")));

        assert!(w.store.snapshot().await.purchase_orders.is_empty());
    }

    #[tokio::test]
    async fn item_failure_rolls_back_the_header() {
        let w = World::new();
        w.store.inject_failure(FailPoint::InsertPurchaseItems, 1);

        let err = w
            .purchase_service()
            .create(&w.ctx_a(), order(vec![line(w.product_x, w.warehouse_a, 3, 2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        let tables = w.store.snapshot().await;
        assert!(tables.purchase_orders.is_empty());
        assert!(tables.purchase_order_items.is_empty());
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, None);
    }

    #[tokio::test]
    async fn delete_is_blocked_when_stock_was_consumed() {
        let w = World::new();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service.create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10)])).await.unwrap();
        w.sale_service()
            .create(
                &ctx,
                CreateSaleInput {
                    customer_id: None,
                    notes: None,
                    branch_id: None,
                    items: vec![SaleItemInput {
                        product_id: w.product_x,
                        warehouse_id: w.warehouse_a,
                        quantity: 3,
                        unit_price: Decimal::from(100),
                    }],
                },
            )
            .await
            .unwrap();

        let err = service.delete(&ctx, created.header.id).await.unwrap_err();

        assert!(matches!(err, AppError::InsufficientStock { available: 2, requested: 5, .. }));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(2));
        assert_eq!(w.store.snapshot().await.purchase_orders.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_received_stock() {
        let w = World::new();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service.create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10)])).await.unwrap();

        service.delete(&ctx, created.header.id).await.unwrap();

        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(0));
        let tables = w.store.snapshot().await;
        assert!(tables.purchase_orders.is_empty());
        assert!(tables.purchase_order_items.is_empty());
    }

    #[tokio::test]
    async fn item_update_moves_the_difference_and_recomputes_total() {
        let w = World::new();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service
            .create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10), line(w.product_y, w.warehouse_a, 2, 3)]))
            .await
            .unwrap();
        let item = created.items.iter().find(|i| i.product_id == w.product_x).unwrap().clone();

        let input = UpdatePurchaseItemInput { warehouse_id: Some(w.warehouse_a2), quantity: Some(8), unit_price: None };
        let detail = service.update_item(&ctx, created.header.id, item.id, input).await.unwrap();

        assert_eq!(detail.header.total_amount, Decimal::from(86));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(0));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a2).await, Some(8));
    }

    #[tokio::test]
    async fn failed_total_update_restores_item_and_stock() {
        let w = World::new();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service.create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10)])).await.unwrap();
        let item_id = created.items[0].id;
        w.store.inject_failure(FailPoint::UpdatePurchaseTotal, 1);

        let input = UpdatePurchaseItemInput { warehouse_id: None, quantity: Some(9), unit_price: None };
        let err = service.update_item(&ctx, created.header.id, item_id, input).await.unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        let tables = w.store.snapshot().await;
        assert_eq!(tables.purchase_order_items[0].quantity, 5);
        assert_eq!(tables.purchase_orders[0].total_amount, Decimal::from(50));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(5));
    }

    #[tokio::test]
    async fn delete_item_takes_its_stock_and_updates_total() {
        let w = World::new();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service
            .create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10), line(w.product_y, w.warehouse_a, 2, 3)]))
            .await
            .unwrap();
        let item = created.items.iter().find(|i| i.product_id == w.product_y).unwrap().clone();

        service.delete_item(&ctx, created.header.id, item.id).await.unwrap();

        let detail = service.get(&ctx, created.header.id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.header.total_amount, Decimal::from(50));
        assert_eq!(w.quantity(w.product_y, w.warehouse_a).await, Some(0));
    }

    #[tokio::test]
    async fn foreign_order_is_not_found() {
        let w = World::new();
        let service = w.purchase_service();
        let foreign = service.create(&w.ctx_b(), order(vec![line(w.product_b, w.warehouse_b, 1, 1)])).await.unwrap();
        let item_id = foreign.items[0].id;
        let ctx = w.ctx_a();

        assert!(matches!(service.get(&ctx, foreign.header.id).await, Err(AppError::NotFoundInScope(_))));
        assert!(matches!(service.delete(&ctx, foreign.header.id).await, Err(AppError::NotFoundInScope(_))));
        assert!(matches!(
            service.delete_item(&ctx, foreign.header.id, item_id).await,
            Err(AppError::NotFoundInScope(_))
        ));
        assert!(service.list(&ctx, &ScopeFilter::default()).await.unwrap().is_empty());
        assert_eq!(w.quantity(w.product_b, w.warehouse_b).await, Some(1));
    }

    #[tokio::test]
    async fn totals_beyond_the_money_columns_are_rejected() {
        let w = World::new();
        let service = w.purchase_service();

        let err = service
            .create(&w.ctx_a(), order(vec![line(w.product_x, w.warehouse_a, 1_000_000, 1_000_000_000)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let huge = PurchaseItemInput { product_id: w.product_x, warehouse_id: w.warehouse_a, quantity: 2, unit_price: Decimal::MAX };
        let err = service.create(&w.ctx_a(), order(vec![huge])).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        assert!(w.store.snapshot().await.purchase_orders.is_empty());
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, None);
    }

    #[tokio::test]
    async fn quantity_above_the_ceiling_is_rejected() {
        let w = World::new();

        let err = w
            .purchase_service()
            .create(&w.ctx_a(), order(vec![line(w.product_x, w.warehouse_a, i32::MAX, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, None);
    }

    #[tokio::test]
    async fn transactional_item_update_commits_stock_item_and_total_together() {
        let w = World::transactional();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service
            .create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10), line(w.product_y, w.warehouse_a, 2, 3)]))
            .await
            .unwrap();
        let item = created.items.iter().find(|i| i.product_id == w.product_x).unwrap().clone();

        let input = UpdatePurchaseItemInput { warehouse_id: Some(w.warehouse_a2), quantity: Some(8), unit_price: None };
        let detail = service.update_item(&ctx, created.header.id, item.id, input).await.unwrap();

        assert_eq!(detail.header.total_amount, Decimal::from(86));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a).await, Some(0));
        assert_eq!(w.quantity(w.product_x, w.warehouse_a2).await, Some(8));
    }

    #[tokio::test]
    async fn transactional_item_delete_failure_changes_nothing() {
        let w = World::transactional();
        let ctx = w.ctx_a();
        let service = w.purchase_service();
        let created = service
            .create(&ctx, order(vec![line(w.product_x, w.warehouse_a, 5, 10), line(w.product_y, w.warehouse_a, 2, 3)]))
            .await
            .unwrap();
        let item = created.items.iter().find(|i| i.product_id == w.product_y).unwrap().clone();
        w.store.inject_failure(FailPoint::Delete, 1);

        let err = service.delete_item(&ctx, created.header.id, item.id).await.unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        let detail = service.get(&ctx, created.header.id).await.unwrap();
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.header.total_amount, Decimal::from(56));
        assert_eq!(w.quantity(w.product_y, w.warehouse_a).await, Some(2));
    }
}
