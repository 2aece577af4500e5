// src/models/sales.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::{
    scope::BranchDefaults,
    validation::{nullable, validate_unit_price},
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub user_id: Uuid,
    #[schema(example = "250.00")]
    pub total_amount: Decimal,
    #[schema(example = "80.00")]
    pub profit_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub branch_id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[schema(example = 2)]
    pub quantity: i32,
    #[schema(example = "100.00")]
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleDetail {
    #[serde(flatten)]
    pub header: Sale,
    pub items: Vec<SaleItem>,
}

// Linhas prontas para o Store (já com filial carimbada e totais resolvidos)
#[derive(Debug, Clone)]
pub struct NewSale {
    /// Gerado pelo núcleo antes da escrita, para os itens já nascerem ligados.
    pub id: Uuid,
    pub branch: BranchDefaults,
    pub customer_id: Option<Uuid>,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub profit_amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub sale_id: Uuid,
    pub branch: BranchDefaults,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleChanges {
    pub customer_id: Option<Uuid>,
    pub notes: Option<String>,
}

// ---
// Payloads
// ---
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemInput {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,

    #[validate(range(min = 1, max = 1_000_000, message = "A quantidade deve estar entre 1 e 1.000.000."))]
    #[schema(example = 2)]
    pub quantity: i32,

    #[validate(custom(function = "validate_unit_price"))]
    #[schema(example = "100.00")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleInput {
    pub customer_id: Option<Uuid>,

    #[validate(length(max = 500, message = "As observações devem ter no máximo 500 caracteres."))]
    pub notes: Option<String>,

    #[validate(length(min = 1, message = "A venda precisa de pelo menos um item."), nested)]
    pub items: Vec<SaleItemInput>,

    /// Só considerado para super-admin.
    pub branch_id: Option<Uuid>,
}

// Só os metadados da venda podem mudar; a estrutura é imutável.
// Campo ausente mantém o valor atual; `null` explícito limpa.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleInput {
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>, nullable)]
    pub customer_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, nullable)]
    #[validate(length(max = 500, message = "As observações devem ter no máximo 500 caracteres."))]
    pub notes: Option<Option<String>>,
}
