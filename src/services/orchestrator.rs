// src/services/orchestrator.rs
//
// Pipeline de escrita. Com um store transacional, todas as escritas de uma
// operação vão para uma única transação e a falha vira rollback. Sem
// transação, cada escrita bem-sucedida registra a ação que a desfaz; se um
// passo posterior falhar, as ações rodam em ordem inversa. Compensações são
// idempotentes (exclusão por id, ajuste inverso) e têm novas tentativas com
// espera linear.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    common::{error::AppError, scope::ScopedQuery, validation::quantity_overflow},
    db::{Store, StoreError, StoreTransaction},
    models::{
        inventory::{
            net_deltas, MovementChanges, NewStockMovement, StockAdjustment, StockDelta, StockMovement,
        },
        purchasing::{
            NewPurchaseOrder, NewPurchaseOrderItem, PurchaseItemChanges, PurchaseOrder, PurchaseOrderItem,
        },
        sales::{NewSale, NewSaleItem, Sale, SaleItem},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Checking,
    WritingHeader,
    WritingChildren,
    Compensating,
    Committed,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Compensation {
    DeleteRow { label: &'static str, query: ScopedQuery },
    AdjustStock(StockDelta),
    RestoreMovement { query: ScopedQuery, changes: MovementChanges },
    RestorePurchaseItem { query: ScopedQuery, changes: PurchaseItemChanges },
    RestorePurchaseTotal { query: ScopedQuery, total_amount: Decimal },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::DeleteRow { label, query } => {
                write!(f, "excluir {} ({}: {:?})", label, query.table().name(), query.filters())
            }
            Compensation::AdjustStock(delta) => write!(
                f,
                "ajustar estoque do produto {} no armazém {} em {}",
                delta.key.product_id, delta.key.warehouse_id, delta.delta
            ),
            Compensation::RestoreMovement { changes, .. } => write!(
                f,
                "restaurar movimentação (produto {}, quantidade {})",
                changes.product_id, changes.quantity
            ),
            Compensation::RestorePurchaseItem { changes, .. } => write!(
                f,
                "restaurar item de compra (armazém {}, quantidade {})",
                changes.warehouse_id, changes.quantity
            ),
            Compensation::RestorePurchaseTotal { total_amount, .. } => {
                write!(f, "restaurar total do pedido de compra ({})", total_amount)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompensationSettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl CompensationSettings {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), retry_delay }
    }
}

impl Default for CompensationSettings {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

pub struct Pipeline<'a> {
    name: &'static str,
    store: &'a dyn Store,
    settings: CompensationSettings,
    stage: Stage,
    compensations: Vec<Compensation>,
    // aberto na primeira escrita
    writer: Option<Box<dyn StoreTransaction + 'a>>,
    transactional: bool,
}

impl<'a> Pipeline<'a> {
    pub fn begin(name: &'static str, store: &'a dyn Store, settings: CompensationSettings) -> Self {
        Self {
            name,
            store,
            settings,
            stage: Stage::Validating,
            compensations: Vec::new(),
            writer: None,
            transactional: false,
        }
    }

    pub fn advance(&mut self, stage: Stage) {
        tracing::trace!(pipeline = self.name, from = ?self.stage, to = ?stage, "Avanço de estágio");
        self.stage = stage;
    }

    /// Registra como desfazer a última escrita. Dentro de uma transação não há
    /// o que registrar: o rollback desfaz tudo.
    pub fn record(&mut self, compensation: Compensation) {
        if !self.transactional {
            self.compensations.push(compensation);
        }
    }

    async fn writer(&mut self) -> Result<&mut (dyn StoreTransaction + 'a), AppError> {
        let writer: Box<dyn StoreTransaction + 'a> = match self.writer.take() {
            Some(writer) => writer,
            None => match self.store.begin().await? {
                Some(tx) => {
                    self.transactional = true;
                    tx
                }
                None => Box::new(Direct(self.store)),
            },
        };
        Ok(&mut **self.writer.insert(writer))
    }

    pub async fn delete(&mut self, query: &ScopedQuery) -> Result<u64, AppError> {
        Ok(self.writer().await?.delete(query).await?)
    }

    pub async fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale, AppError> {
        Ok(self.writer().await?.insert_sale(sale).await?)
    }

    pub async fn insert_sale_items(&mut self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, AppError> {
        Ok(self.writer().await?.insert_sale_items(items).await?)
    }

    pub async fn insert_purchase_order(&mut self, order: &NewPurchaseOrder) -> Result<PurchaseOrder, AppError> {
        Ok(self.writer().await?.insert_purchase_order(order).await?)
    }

    pub async fn insert_purchase_items(
        &mut self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, AppError> {
        Ok(self.writer().await?.insert_purchase_items(items).await?)
    }

    pub async fn update_purchase_item(
        &mut self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, AppError> {
        Ok(self.writer().await?.update_purchase_item(query, changes).await?)
    }

    pub async fn update_purchase_total(
        &mut self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, AppError> {
        Ok(self.writer().await?.update_purchase_total(query, total_amount).await?)
    }

    pub async fn insert_movement(&mut self, movement: &NewStockMovement) -> Result<StockMovement, AppError> {
        Ok(self.writer().await?.insert_movement(movement).await?)
    }

    pub async fn update_movement(
        &mut self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, AppError> {
        Ok(self.writer().await?.update_movement(query, changes).await?)
    }

    /// Aplica os deltas (já somados, entradas antes das saídas) com o ajuste
    /// condicional do store. A primeira recusa interrompe o pipeline.
    pub async fn apply_deltas(
        &mut self,
        deltas: impl IntoIterator<Item = StockDelta>,
    ) -> Result<(), AppError> {
        let netted = net_deltas(deltas).ok_or_else(quantity_overflow)?;
        for delta in netted {
            match self.writer().await?.adjust_stock(&delta).await? {
                StockAdjustment::Applied { .. } => {
                    self.record(Compensation::AdjustStock(delta.inverse()));
                }
                adjustment => return Err(rejection(&delta, adjustment)),
            }
        }
        Ok(())
    }

    pub async fn commit(mut self) -> Result<(), AppError> {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.commit().await {
                tracing::error!(pipeline = self.name, error = %e, "Commit da transação falhou");
                self.advance(Stage::Failed);
                return Err(e.into());
            }
        }
        self.advance(Stage::Committed);
        self.compensations.clear();
        Ok(())
    }

    /// Desfaz o que foi gravado e devolve o erro final. Se alguma compensação
    /// não puder ser concluída, o erro vira `CompensationFailure` (o original
    /// continua sendo o exibido).
    pub async fn fail(mut self, error: AppError) -> AppError {
        let failed_at = self.stage;

        if self.transactional {
            if let Some(writer) = self.writer.as_mut() {
                if let Err(reason) = writer.rollback().await {
                    // a transação descartada não chega a ser confirmada
                    tracing::warn!(pipeline = self.name, %reason, "Rollback falhou");
                }
            }
            self.advance(Stage::Failed);
            tracing::info!(pipeline = self.name, stage = ?failed_at, error = %error, "Transação desfeita após falha");
            return error;
        }

        if self.compensations.is_empty() {
            self.advance(Stage::Failed);
            tracing::debug!(pipeline = self.name, stage = ?failed_at, error = %error, "Falha antes de qualquer escrita");
            return error;
        }

        self.advance(Stage::Compensating);
        let mut pending = Vec::new();
        while let Some(compensation) = self.compensations.pop() {
            if !self.undo_with_retry(&compensation).await {
                pending.push(compensation.to_string());
            }
        }
        self.advance(Stage::Failed);

        if pending.is_empty() {
            tracing::info!(pipeline = self.name, stage = ?failed_at, error = %error, "Escrita desfeita após falha");
            return error;
        }

        tracing::error!(
            target: "compensation",
            pipeline = self.name,
            stage = ?failed_at,
            pending = ?pending,
            error = %error,
            "Compensação incompleta; reconciliação manual necessária"
        );
        AppError::CompensationFailure { source: Box::new(error), pending }
    }

    async fn undo_with_retry(&self, compensation: &Compensation) -> bool {
        let attempts = self.settings.max_attempts;
        for attempt in 1..=attempts {
            match self.undo(compensation).await {
                Ok(()) => return true,
                Err(reason) => {
                    tracing::warn!(
                        pipeline = self.name,
                        attempt,
                        action = %compensation,
                        %reason,
                        "Compensação falhou"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay * attempt).await;
                    }
                }
            }
        }
        false
    }

    // Linhas já ausentes contam como desfeitas
    async fn undo(&self, compensation: &Compensation) -> Result<(), String> {
        match compensation {
            Compensation::DeleteRow { query, .. } => {
                self.store.delete(query).await.map(|_| ()).map_err(|e| e.to_string())
            }
            Compensation::AdjustStock(delta) => {
                match self.store.adjust_stock(delta).await.map_err(|e| e.to_string())? {
                    StockAdjustment::Applied { .. } => Ok(()),
                    other => Err(format!("ajuste recusado: {:?}", other)),
                }
            }
            Compensation::RestoreMovement { query, changes } => self
                .store
                .update_movement(query, changes)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Compensation::RestorePurchaseItem { query, changes } => self
                .store
                .update_purchase_item(query, changes)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Compensation::RestorePurchaseTotal { query, total_amount } => self
                .store
                .update_purchase_total(query, *total_amount)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

/// Converte a recusa de um ajuste no erro visto pelo usuário.
fn rejection(delta: &StockDelta, adjustment: StockAdjustment) -> AppError {
    match adjustment {
        StockAdjustment::Insufficient { available } => AppError::InsufficientStock {
            product_id: delta.key.product_id,
            warehouse_id: delta.key.warehouse_id,
            available,
            requested: -delta.delta,
        },
        StockAdjustment::OutOfScope | StockAdjustment::Applied { .. } => {
            AppError::NotFoundInScope("estoque")
        }
    }
}

// Store sem transação: grava direto, e o pipeline compensa.
struct Direct<'a>(&'a dyn Store);

#[async_trait]
impl<'a> StoreTransaction for Direct<'a> {
    async fn delete(&mut self, query: &ScopedQuery) -> Result<u64, StoreError> {
        self.0.delete(query).await
    }

    async fn adjust_stock(&mut self, delta: &StockDelta) -> Result<StockAdjustment, StoreError> {
        self.0.adjust_stock(delta).await
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale, StoreError> {
        self.0.insert_sale(sale).await
    }

    async fn insert_sale_items(&mut self, items: &[NewSaleItem]) -> Result<Vec<SaleItem>, StoreError> {
        self.0.insert_sale_items(items).await
    }

    async fn insert_purchase_order(
        &mut self,
        order: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError> {
        self.0.insert_purchase_order(order).await
    }

    async fn insert_purchase_items(
        &mut self,
        items: &[NewPurchaseOrderItem],
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        self.0.insert_purchase_items(items).await
    }

    async fn update_purchase_item(
        &mut self,
        query: &ScopedQuery,
        changes: &PurchaseItemChanges,
    ) -> Result<Option<PurchaseOrderItem>, StoreError> {
        self.0.update_purchase_item(query, changes).await
    }

    async fn update_purchase_total(
        &mut self,
        query: &ScopedQuery,
        total_amount: Decimal,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        self.0.update_purchase_total(query, total_amount).await
    }

    async fn insert_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> Result<StockMovement, StoreError> {
        self.0.insert_movement(movement).await
    }

    async fn update_movement(
        &mut self,
        query: &ScopedQuery,
        changes: &MovementChanges,
    ) -> Result<Option<StockMovement>, StoreError> {
        self.0.update_movement(query, changes).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
