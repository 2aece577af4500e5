// src/models/purchasing.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::{scope::BranchDefaults, validation::validate_unit_price};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub user_id: Uuid,
    #[schema(example = "1200.00")]
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub branch_id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[schema(example = 10)]
    pub quantity: i32,
    #[schema(example = "12.00")]
    pub unit_price: Decimal,
    #[schema(example = "120.00")]
    pub total_price: Decimal,
}

impl PurchaseOrderItem {
    pub fn changes(&self) -> PurchaseItemChanges {
        PurchaseItemChanges {
            warehouse_id: self.warehouse_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub header: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub id: Uuid,
    pub branch: BranchDefaults,
    pub supplier_id: Option<Uuid>,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPurchaseOrderItem {
    pub purchase_order_id: Uuid,
    pub branch: BranchDefaults,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseItemChanges {
    pub warehouse_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PurchaseItemChanges {
    pub fn total_price(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

// ---
// Payloads
// ---
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItemInput {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,

    #[validate(range(min = 1, max = 1_000_000, message = "A quantidade deve estar entre 1 e 1.000.000."))]
    #[schema(example = 10)]
    pub quantity: i32,

    #[validate(custom(function = "validate_unit_price"))]
    #[schema(example = "12.00")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Option<Uuid>,

    #[validate(length(max = 500, message = "As observações devem ter no máximo 500 caracteres."))]
    pub notes: Option<String>,

    #[validate(length(min = 1, message = "O pedido precisa de pelo menos um item."), nested)]
    pub items: Vec<PurchaseItemInput>,

    /// Só considerado para super-admin.
    pub branch_id: Option<Uuid>,
}

// Campos ausentes mantêm o valor atual do item
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePurchaseItemInput {
    pub warehouse_id: Option<Uuid>,

    #[validate(range(min = 1, max = 1_000_000, message = "A quantidade deve estar entre 1 e 1.000.000."))]
    pub quantity: Option<i32>,

    #[validate(custom(function = "validate_unit_price"))]
    pub unit_price: Option<Decimal>,
}
