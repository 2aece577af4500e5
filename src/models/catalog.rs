// src/models/catalog.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[schema(example = "Bebidas")]
    pub name: String,
}

// Produto do catálogo, escopo da organização.
// Os preços aqui são a base do lucro no momento da venda (snapshot).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub category_id: Option<Uuid>,
    #[schema(example = "Café Torrado 500g")]
    pub name: String,
    #[schema(example = "7891234567890")]
    pub barcode: Option<String>,
    #[schema(example = "18.50")]
    pub cost_price: Decimal,
    #[schema(example = "29.90")]
    pub selling_price: Decimal,
}

// Armazém. `branch_id` nulo = armazém compartilhado pela organização.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub branch_id: Option<Uuid>,
    #[schema(example = "Depósito Norte")]
    pub name: String,
    pub location: Option<String>,
}

// Cliente ou fornecedor (mesma forma, tabelas diferentes).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
}
