// src/handlers/stock.rs

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        response::{success, success_with},
    },
    config::AppState,
    models::{
        inventory::{ProductStock, SetStockLevelInput, WarehouseValuation},
        tenancy::{ScopeFilter, TenantContext},
    },
};

#[utoipa::path(
    get,
    path = "/api/stock-levels",
    tag = "Estoque",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Saldos do escopo", body = Vec<ProductStock>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_stock_levels(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(filter): Query<ScopeFilter>,
) -> Result<impl IntoResponse, AppError> {
    let levels = app_state.stock_service.list(&ctx, &filter).await?;
    Ok(success_with("stockLevels", levels))
}

#[utoipa::path(
    put,
    path = "/api/stock-levels",
    tag = "Estoque",
    request_body = SetStockLevelInput,
    responses(
        (status = 200, description = "Saldo gravado", body = ProductStock),
        (status = 400, description = "Quantidade negativa"),
        (status = 404, description = "Produto ou armazém fora do escopo")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_stock_level(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<SetStockLevelInput>,
) -> Result<impl IntoResponse, AppError> {
    let level = app_state.stock_service.set_level(&ctx, payload).await?;
    Ok(success_with("stockLevel", level))
}

#[utoipa::path(
    delete,
    path = "/api/stock-levels/{id}",
    tag = "Estoque",
    params(("id" = Uuid, Path, description = "ID do saldo")),
    responses(
        (status = 200, description = "Saldo excluído"),
        (status = 404, description = "Saldo não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_stock_level(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.stock_service.delete_level(&ctx, id).await?;
    Ok(success())
}

#[utoipa::path(
    get,
    path = "/api/warehouses/valuation",
    tag = "Estoque",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Custo, receita e lucro projetado por armazém", body = Vec<WarehouseValuation>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_valuations(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(filter): Query<ScopeFilter>,
) -> Result<impl IntoResponse, AppError> {
    let valuations = app_state.stock_service.valuations(&ctx, &filter).await?;
    Ok(success_with("valuations", valuations))
}

#[utoipa::path(
    get,
    path = "/api/warehouses/{id}/valuation",
    tag = "Estoque",
    params(("id" = Uuid, Path, description = "ID do armazém")),
    responses(
        (status = 200, description = "Valorização do armazém", body = WarehouseValuation),
        (status = 404, description = "Armazém não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_valuation(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let valuation = app_state.stock_service.valuation(&ctx, id).await?;
    Ok(success_with("valuation", valuation))
}
