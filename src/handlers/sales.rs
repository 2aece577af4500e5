// src/handlers/sales.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
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
        sales::{CreateSaleInput, Sale, SaleDetail, UpdateSaleInput},
        tenancy::{ScopeFilter, TenantContext},
    },
};

#[utoipa::path(
    post,
    path = "/api/sales",
    tag = "Vendas",
    request_body = CreateSaleInput,
    responses(
        (status = 201, description = "Venda registrada", body = SaleDetail),
        (status = 400, description = "Dados inválidos"),
        (status = 404, description = "Cliente, produto ou armazém fora do escopo"),
        (status = 409, description = "Estoque insuficiente")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_sale(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateSaleInput>,
) -> Result<impl IntoResponse, AppError> {
    let sale = app_state.sale_service.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, success_with("sale", sale)))
}

#[utoipa::path(
    get,
    path = "/api/sales",
    tag = "Vendas",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Vendas do escopo, mais recentes primeiro", body = Vec<Sale>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_sales(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(filter): Query<ScopeFilter>,
) -> Result<impl IntoResponse, AppError> {
    let sales = app_state.sale_service.list(&ctx, &filter).await?;
    Ok(success_with("sales", sales))
}

#[utoipa::path(
    get,
    path = "/api/sales/{id}",
    tag = "Vendas",
    params(("id" = Uuid, Path, description = "ID da venda")),
    responses(
        (status = 200, description = "Venda com itens", body = SaleDetail),
        (status = 404, description = "Venda não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_sale(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let sale = app_state.sale_service.get(&ctx, id).await?;
    Ok(success_with("sale", sale))
}

#[utoipa::path(
    patch,
    path = "/api/sales/{id}",
    tag = "Vendas",
    request_body = UpdateSaleInput,
    params(("id" = Uuid, Path, description = "ID da venda")),
    responses(
        (status = 200, description = "Cliente/observações atualizados", body = Sale),
        (status = 404, description = "Venda não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_sale(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSaleInput>,
) -> Result<impl IntoResponse, AppError> {
    let sale = app_state.sale_service.update(&ctx, id, payload).await?;
    Ok(success_with("sale", sale))
}

#[utoipa::path(
    delete,
    path = "/api/sales/{id}",
    tag = "Vendas",
    params(("id" = Uuid, Path, description = "ID da venda")),
    responses(
        (status = 200, description = "Venda excluída e estoque devolvido"),
        (status = 404, description = "Venda não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_sale(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.sale_service.delete(&ctx, id).await?;
    Ok(success())
}
