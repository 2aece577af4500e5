// src/models/inventory.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::scope::BranchDefaults;

/// Valor que a interface manda quando o campo de armazém fica vazio.
pub const NO_WAREHOUSE: &str = "none";

// --- 1. Saldo de estoque (product_stocks) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductStock {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub branch_id: Uuid,
    #[schema(example = 42)]
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}

/// Identifica o saldo que um ajuste atinge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StockKey {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub branch_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDelta {
    pub key: StockKey,
    pub delta: i32,
}

impl StockDelta {
    pub fn new(key: StockKey, delta: i32) -> Self {
        Self { key, delta }
    }

    pub fn inverse(&self) -> Self {
        Self { key: self.key, delta: -self.delta }
    }
}

/// Soma os deltas por saldo, descarta os nulos e coloca as entradas antes
/// das saídas (a ordem em que devem ser aplicados). `None` se alguma soma
/// estourar `i32`.
pub fn net_deltas(deltas: impl IntoIterator<Item = StockDelta>) -> Option<Vec<StockDelta>> {
    let mut order: Vec<StockKey> = Vec::new();
    let mut sums: HashMap<StockKey, i32> = HashMap::new();
    for d in deltas {
        if !sums.contains_key(&d.key) {
            order.push(d.key);
        }
        let sum = sums.entry(d.key).or_insert(0);
        *sum = sum.checked_add(d.delta)?;
    }

    let mut netted: Vec<StockDelta> = order
        .into_iter()
        .filter_map(|key| match sums.get(&key) {
            Some(&delta) if delta != 0 => Some(StockDelta::new(key, delta)),
            _ => None,
        })
        .collect();
    // sort estável: mantém a ordem de aparição dentro de cada grupo
    netted.sort_by_key(|d| d.delta < 0);
    Some(netted)
}

/// Resultado do ajuste condicional feito pelo Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    Applied { quantity: i32 },
    /// A saída deixaria o saldo negativo; nada foi gravado.
    Insufficient { available: i32 },
    /// O saldo existe, mas pertence a outra filial.
    OutOfScope,
}

// Linha nova/atualização absoluta de saldo (PUT /stock-levels)
#[derive(Debug, Clone)]
pub struct NewStockLevel {
    pub branch: BranchDefaults,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetStockLevelInput {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(range(min = 0, max = 1_000_000, message = "A quantidade deve estar entre 0 e 1.000.000."))]
    #[schema(example = 100)]
    pub quantity: i32,
    /// Só considerado para super-admin.
    pub branch_id: Option<Uuid>,
}

// --- 2. Movimentações ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub product_id: Uuid,
    pub from_warehouse_id: Option<Uuid>,
    pub to_warehouse_id: Option<Uuid>,
    #[schema(example = 5)]
    pub quantity: i32,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Efeito da movimentação sobre os saldos: origem -q, destino +q.
    pub fn effect(&self) -> Vec<StockDelta> {
        movement_effect(self.branch_id, &self.changes())
    }

    pub fn changes(&self) -> MovementChanges {
        MovementChanges {
            product_id: self.product_id,
            from_warehouse_id: self.from_warehouse_id,
            to_warehouse_id: self.to_warehouse_id,
            quantity: self.quantity,
            notes: self.notes.clone(),
        }
    }
}

pub fn movement_effect(branch_id: Uuid, changes: &MovementChanges) -> Vec<StockDelta> {
    let mut deltas = Vec::with_capacity(2);
    if let Some(from) = changes.from_warehouse_id {
        let key = StockKey { product_id: changes.product_id, warehouse_id: from, branch_id };
        deltas.push(StockDelta::new(key, -changes.quantity));
    }
    if let Some(to) = changes.to_warehouse_id {
        let key = StockKey { product_id: changes.product_id, warehouse_id: to, branch_id };
        deltas.push(StockDelta::new(key, changes.quantity));
    }
    deltas
}

#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub branch: BranchDefaults,
    pub created_by: Uuid,
    pub changes: MovementChanges,
}

/// Campos mutáveis de uma movimentação (update completo).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementChanges {
    pub product_id: Uuid,
    pub from_warehouse_id: Option<Uuid>,
    pub to_warehouse_id: Option<Uuid>,
    pub quantity: i32,
    pub notes: Option<String>,
}

// Referência de armazém vinda da interface: um UUID, ou o sentinela "none"
// (ou vazio) significando "sem armazém".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum WarehouseSelection {
    Id(Uuid),
    Sentinel(String),
}

impl WarehouseSelection {
    /// `Err` devolve o texto que não é UUID nem sentinela.
    pub fn normalize(&self) -> Result<Option<Uuid>, String> {
        match self {
            WarehouseSelection::Id(id) => Ok(Some(*id)),
            WarehouseSelection::Sentinel(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_WAREHOUSE) {
                    Ok(None)
                } else {
                    Err(raw.clone())
                }
            }
        }
    }
}

// Payload de criação e de atualização (o update é completo)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementInput {
    pub product_id: Uuid,

    #[serde(default)]
    pub from_warehouse_id: Option<WarehouseSelection>,

    #[serde(default)]
    pub to_warehouse_id: Option<WarehouseSelection>,

    #[validate(range(min = 1, max = 1_000_000, message = "A quantidade deve estar entre 1 e 1.000.000."))]
    #[schema(example = 5)]
    pub quantity: i32,

    #[validate(length(max = 500, message = "As observações devem ter no máximo 500 caracteres."))]
    pub notes: Option<String>,

    /// Só considerado para super-admin na criação.
    pub branch_id: Option<Uuid>,
}

// --- 3. Valorização por armazém (procedures do banco) ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseValuation {
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    #[schema(example = "1850.00")]
    pub total_cost: Decimal,
    #[schema(example = "2990.00")]
    pub total_revenue: Decimal,
    #[schema(example = "1140.00")]
    pub projected_profit: Decimal,
}
