// src/db/pg_store.rs

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Executor, FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction,
};
use uuid::Uuid;

use crate::{
    common::scope::{Filter, ScopedQuery, Table},
    db::store::{Store, StoreError, StoreTransaction},
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

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Roda as migrações de `migrations/` (esquema + procedures de valorização).
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    async fn fetch_all<T>(&self, query: &ScopedQuery) -> Result<Vec<T>, StoreError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut builder = select_builder(query);
        let rows = builder.build_query_as::<T>().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

// ---
// Montagem de SQL a partir do descritor escopado
// ---
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &[Filter]) {
    for (index, filter) in filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(column, value) => {
                builder.push(*column).push(" = ").push_bind(*value);
            }
            Filter::EqOrNull(column, value) => {
                builder
                    .push("(")
                    .push(*column)
                    .push(" = ")
                    .push_bind(*value)
                    .push(" OR ")
                    .push(*column)
                    .push(" IS NULL)");
            }
            // Lista vazia não casa com nada (= ANY('{}') é falso)
            Filter::In(column, values) => {
                builder.push(*column).push(" = ANY(").push_bind(values.clone()).push(")");
            }
        }
    }
}

fn order_column(table: Table) -> Option<&'static str> {
    match table {
        Table::Sales | Table::PurchaseOrders | Table::StockMovements => Some("created_at"),
        Table::ProductStocks => Some("updated_at"),
        _ => None,
    }
}

fn select_builder(query: &ScopedQuery) -> QueryBuilder<'static, Postgres> {
    let table = query.table();
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {}", table.name()));
    push_filters(&mut builder, query.filters());
    if query.is_newest_first() {
        if let Some(column) = order_column(table) {
            builder.push(format!(" ORDER BY {} DESC", column));
        }
    }
    if let Some(limit) = query.limit() {
        builder.push(" LIMIT ").push_bind(limit);
    }
    builder
}

fn classify(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_foreign_key_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            return StoreError::ForeignKeyViolation(constraint.to_string());
        }
    }
    StoreError::Database(e)
}

// ---
// Escritas reutilizadas dentro e fora de transação
// ---
async fn insert_sale_on<'e, E>(executor: E, sale: &NewSale) -> Result<Sale, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, Sale>(
        r#"
        INSERT INTO sales (id, branch_id, customer_id, user_id, total_amount, profit_amount, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(sale.id)
    .bind(sale.branch.branch_id())
    .bind(sale.customer_id)
    .bind(sale.user_id)
    .bind(sale.total_amount)
    .bind(sale.profit_amount)
    .bind(sale.notes.as_deref())
    .fetch_one(executor)
    .await?;
    Ok(row)
}

async fn insert_sale_items_on<'e, E>(
    executor: E,
    items: &[NewSaleItem],
) -> Result<Vec<SaleItem>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO sale_items (sale_id, branch_id, product_id, warehouse_id, quantity, unit_price) ",
    );
    builder.push_values(items, |mut row, item| {
        row.push_bind(item.sale_id)
            .push_bind(item.branch.branch_id())
            .push_bind(item.product_id)
            .push_bind(item.warehouse_id)
            .push_bind(item.quantity)
            .push_bind(item.unit_price);
    });
    builder.push(" RETURNING *");
    let rows = builder.build_query_as::<SaleItem>().fetch_all(executor).await?;
    Ok(rows)
}

async fn insert_purchase_order_on<'e, E>(
    executor: E,
    order: &NewPurchaseOrder,
) -> Result<PurchaseOrder, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, PurchaseOrder>(
        r#"
        INSERT INTO purchase_orders (id, branch_id, supplier_id, user_id, total_amount, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(order.branch.branch_id())
    .bind(order.supplier_id)
    .bind(order.user_id)
    .bind(order.total_amount)
    .bind(order.notes.as_deref())
    .fetch_one(executor)
    .await?;
    Ok(row)
}

async fn insert_purchase_items_on<'e, E>(
    executor: E,
    items: &[NewPurchaseOrderItem],
) -> Result<Vec<PurchaseOrderItem>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO purchase_order_items \
         (purchase_order_id, branch_id, product_id, warehouse_id, quantity, unit_price, total_price) ",
    );
    builder.push_values(items, |mut row, item| {
        row.push_bind(item.purchase_order_id)
            .push_bind(item.branch.branch_id())
            .push_bind(item.product_id)
            .push_bind(item.warehouse_id)
            .push_bind(item.quantity)
            .push_bind(item.unit_price)
            .push_bind(item.total_price);
    });
    builder.push(" RETURNING *");
    let rows = builder.build_query_as::<PurchaseOrderItem>().fetch_all(executor).await?;
    Ok(rows)
}

async fn delete_on<'e, E>(executor: E, query: &ScopedQuery) -> Result<u64, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut builder = QueryBuilder::<Postgres>::new(format!("DELETE FROM {}", query.table().name()));
    push_filters(&mut builder, query.filters());
    let result = builder.build().execute(executor).await.map_err(classify)?;
    Ok(result.rows_affected())
}

async fn update_purchase_item_on<'e, E>(
    executor: E,
    query: &ScopedQuery,
    changes: &PurchaseItemChanges,
) -> Result<Option<PurchaseOrderItem>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("UPDATE {} SET warehouse_id = ", query.table().name()));
    builder
        .push_bind(changes.warehouse_id)
        .push(", quantity = ")
        .push_bind(changes.quantity)
        .push(", unit_price = ")
        .push_bind(changes.unit_price)
        .push(", total_price = ")
        .push_bind(changes.total_price());
    push_filters(&mut builder, query.filters());
    builder.push(" RETURNING *");
    let row = builder.build_query_as::<PurchaseOrderItem>().fetch_optional(executor).await?;
    Ok(row)
}

async fn update_purchase_total_on<'e, E>(
    executor: E,
    query: &ScopedQuery,
    total_amount: Decimal,
) -> Result<Option<PurchaseOrder>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("UPDATE {} SET total_amount = ", query.table().name()));
    builder.push_bind(total_amount);
    push_filters(&mut builder, query.filters());
    builder.push(" RETURNING *");
    let row = builder.build_query_as::<PurchaseOrder>().fetch_optional(executor).await?;
    Ok(row)
}

async fn insert_movement_on<'e, E>(
    executor: E,
    movement: &NewStockMovement,
) -> Result<StockMovement, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let changes = &movement.changes;
    let row = sqlx::query_as::<_, StockMovement>(
        r#"
        INSERT INTO stock_movements
            (branch_id, product_id, from_warehouse_id, to_warehouse_id, quantity, notes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(movement.branch.branch_id())
    .bind(changes.product_id)
    .bind(changes.from_warehouse_id)
    .bind(changes.to_warehouse_id)
    .bind(changes.quantity)
    .bind(changes.notes.as_deref())
    .bind(movement.created_by)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

async fn update_movement_on<'e, E>(
    executor: E,
    query: &ScopedQuery,
    changes: &MovementChanges,
) -> Result<Option<StockMovement>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("UPDATE {} SET product_id = ", query.table().name()));
    builder
        .push_bind(changes.product_id)
        .push(", from_warehouse_id = ")
        .push_bind(changes.from_warehouse_id)
        .push(", to_warehouse_id = ")
        .push_bind(changes.to_warehouse_id)
        .push(", quantity = ")
        .push_bind(changes.quantity)
        .push(", notes = ")
        .push_bind(changes.notes.clone());
    push_filters(&mut builder, query.filters());
    builder.push(" RETURNING *");
    let row = builder.build_query_as::<StockMovement>().fetch_optional(executor).await?;
    Ok(row)
}

// Várias instruções na mesma conexão, por isso `&mut PgConnection`
async fn adjust_stock_on(
    conn: &mut PgConnection,
    delta: &StockDelta,
) -> Result<StockAdjustment, StoreError> {
    let key = &delta.key;

    if delta.delta >= 0 {
        let quantity: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO product_stocks (product_id, warehouse_id, branch_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, warehouse_id)
            DO UPDATE SET quantity = product_stocks.quantity + EXCLUDED.quantity, updated_at = NOW()
            WHERE product_stocks.branch_id = EXCLUDED.branch_id
            RETURNING quantity
            "#,
        )
        .bind(key.product_id)
        .bind(key.warehouse_id)
        .bind(key.branch_id)
        .bind(delta.delta)
        .fetch_optional(&mut *conn)
        .await?;

        return Ok(match quantity {
            Some(quantity) => StockAdjustment::Applied { quantity },
            None => StockAdjustment::OutOfScope,
        });
    }

    let updated: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE product_stocks
        SET quantity = quantity + $4, updated_at = NOW()
        WHERE product_id = $1 AND warehouse_id = $2 AND branch_id = $3
          AND quantity + $4 >= 0
        RETURNING quantity
        "#,
    )
    .bind(key.product_id)
    .bind(key.warehouse_id)
    .bind(key.branch_id)
    .bind(delta.delta)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(quantity) = updated {
        return Ok(StockAdjustment::Applied { quantity });
    }

    // Nada foi alterado: descobre o motivo para devolver um erro preciso
    let current: Option<(Uuid, i32)> = sqlx::query_as(
        "SELECT branch_id, quantity FROM product_stocks WHERE product_id = $1 AND warehouse_id = $2",
    )
    .bind(key.product_id)
    .bind(key.warehouse_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match current {
        Some((branch_id, _)) if branch_id != key.branch_id => StockAdjustment::OutOfScope,
        Some((_, available)) => StockAdjustment::Insufficient { available },
        None => StockAdjustment::Insufficient { available: 0 },
    })
}

#[async_trait]
impl Store for PgStore {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT
                p.user_id, p.organization_id, p.branch_id, p.role,
                o.name AS organization_name,
                o.active AS organization_active,
                b.name AS branch_name
            FROM profiles p
            LEFT JOIN organizations o ON o.id = p.organization_id
            LEFT JOIN branches b ON b.id = p.branch_id
            WHERE p.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn exists(&self, query: &ScopedQuery) -> Result<bool, StoreError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT EXISTS(SELECT 1 FROM {}", query.table().name()));
        push_filters(&mut builder, query.filters());
        builder.push(")");
        let found = builder.build_query_scalar::<bool>().fetch_one(&self.pool).await?;
        Ok(found)
    }

    async fn delete(&self, query: &ScopedQuery) -> Result<u64, StoreError> {
        delete_on(&self.pool, query).await
    }

    async fn select_products(&self, query: &ScopedQuery) -> Result<Vec<Product>, StoreError> {
        self.fetch_all(query).await
    }

    async fn select_warehouses(&self, query: &ScopedQuery) -> Result<Vec<Warehouse>, StoreError> {
        self.fetch_all(query).await
    }

    async fn select_stock(&self, query: &ScopedQuery) -> Result<Vec<ProductStock>, StoreError> {
        self.fetch_all(query).await
    }

    async fn adjust_stock(&self, delta: &StockDelta) -> Result<StockAdjustment, StoreError> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock_on(&mut conn, delta).await
    }

    async fn set_stock(&self, level: &NewStockLevel) -> Result<Option<ProductStock>, StoreError> {
        let row = sqlx::query_as::<_, ProductStock>(
            r#"
            INSERT INTO product_stocks (product_id, warehouse_id, branch_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, warehouse_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            WHERE product_stocks.branch_id = EXCLUDED.branch_id
            RETURNING *
            "#,
        )
        .bind(level.product_id)
        .bind(level.warehouse_id)
        .bind(level.branch.branch_id())
        .bind(level.quantity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn warehouse_valuation(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Option<WarehouseValuation>, StoreError> {
        let row = sqlx::query_as::<_, WarehouseValuation>("SELECT * FROM get_warehouse_valuation($1)")
            .bind(warehouse_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn warehouse_valuations(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<WarehouseValuation>, StoreError> {
        let rows = sqlx::query_as::<_, WarehouseValuation>("SELECT * FROM get_warehouse_valuations($1)")
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn select_sales(&self, query: &ScopedQuery) -> Result<Vec<Sale>, StoreError> {
        self.fetch_all(query).await
    }

    async fn select_sale_items(&self, query: &ScopedQuery) -> Result<Vec<SaleItem>, StoreError> {
        self.fetch_all(query).await
    }

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError> {
        insert_sale_on(&self.pool, sale).await
    }

    async fn insert_sale_items(&self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError> {
        insert_sale_items_on(&self.pool, items).await
    }

    async fn update_sale(
        &self,
        query: &ScopedQuery,
        changes: &SaleChanges,
    ) -> Result<Option<Sale>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET customer_id = ", query.table().name()));
        builder
            .push_bind(changes.customer_id)
            .push(", notes = ")
            .push_bind(changes.notes.clone());
        push_filters(&mut builder, query.filters());
        builder.push(" RETURNING *");
        let row = builder.build_query_as::<Sale>().fetch_optional(&self.pool).await?;
        Ok(row)
    }

    async fn select_purchase_orders(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<PurchaseOrder>, StoreError> {
        self.fetch_all(query).await
    }

    async fn select_purchase_items(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        self.fetch_all(query).await
    }

    async fn insert_purchase_order(
        &self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError> {
        insert_purchase_order_on(&self.pool, order).await
    }

    async fn insert_purchase_items(
        &self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        insert_purchase_items_on(&self.pool, items).await
    }

    async fn update_purchase_item(
        &self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError> {
        update_purchase_item_on(&self.pool, query, changes).await
    }

    async fn update_purchase_total(
        &self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        update_purchase_total_on(&self.pool, query, total_amount).await
    }

    async fn select_movements(
        &self,
        query: &ScopedQuery,
    ) -> Result<Vec<StockMovement>, StoreError> {
        self.fetch_all(query).await
    }

    async fn insert_movement(
        &self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError> {
        insert_movement_on(&self.pool, movement).await
    }

    async fn update_movement(
        &self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError> {
        update_movement_on(&self.pool, query, changes).await
    }

    async fn begin(&self) -> Result<Option<Box<dyn StoreTransaction>>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Some(Box::new(PgTransaction { tx: Some(tx) })))
    }
}

/// Transação aberta por `PgStore::begin`. Descartada sem `commit`, o sqlx
/// faz o rollback ao devolver a conexão ao pool.
pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Unavailable("transação já encerrada".into()))
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn delete(&mut self, query: &ScopedQuery) -> Result<u64, StoreError> {
        delete_on(self.conn()?, query).await
    }

    async fn adjust_stock(&mut self, delta: &StockDelta) -> Result<StockAdjustment, StoreError> {
        adjust_stock_on(self.conn()?, delta).await
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale, StoreError> {
        insert_sale_on(self.conn()?, sale).await
    }

    async fn insert_sale_items(&mut self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError> {
        insert_sale_items_on(self.conn()?, items).await
    }

    async fn insert_purchase_order(
        &mut self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError> {
        insert_purchase_order_on(self.conn()?, order).await
    }

    async fn insert_purchase_items(
        &mut self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        insert_purchase_items_on(self.conn()?, items).await
    }

    async fn update_purchase_item(
        &mut self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError> {
        update_purchase_item_on(self.conn()?, query, changes).await
    }

    async fn update_purchase_total(
        &mut self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        update_purchase_total_on(self.conn()?, query, total_amount).await
    }

    async fn insert_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError> {
        insert_movement_on(self.conn()?, movement).await
    }

    async fn update_movement(
        &mut self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError> {
        update_movement_on(self.conn()?, query, changes).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(StoreError::Unavailable("transação já encerrada".into())),
        }
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
