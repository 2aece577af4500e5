// src/handlers/purchases.rs

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
        purchasing::{CreatePurchaseOrderInput, PurchaseOrder, PurchaseOrderDetail, UpdatePurchaseItemInput},
        tenancy::{ScopeFilter, TenantContext},
    },
};

#[utoipa::path(
    post,
    path = "/api/purchase-orders",
    tag = "Compras",
    request_body = CreatePurchaseOrderInput,
    responses(
        (status = 201, description = "Pedido de compra registrado e estoque recebido", body = PurchaseOrderDetail),
        (status = 400, description = "Dados inválidos"),
        (status = 404, description = "Fornecedor, produto ou armazém fora do escopo")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_purchase_order(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreatePurchaseOrderInput>,
) -> Result<impl IntoResponse, AppError> {
    let order = app_state.purchase_service.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, success_with("purchaseOrder", order)))
}

#[utoipa::path(
    get,
    path = "/api/purchase-orders",
    tag = "Compras",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Pedidos de compra do escopo", body = Vec<PurchaseOrder>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_purchase_orders(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(filter): Query<ScopeFilter>,
) -> Result<impl IntoResponse, AppError> {
    let orders = app_state.purchase_service.list(&ctx, &filter).await?;
    Ok(success_with("purchaseOrders", orders))
}

#[utoipa::path(
    get,
    path = "/api/purchase-orders/{id}",
    tag = "Compras",
    params(("id" = Uuid, Path, description = "ID do pedido")),
    responses(
        (status = 200, description = "Pedido com itens", body = PurchaseOrderDetail),
        (status = 404, description = "Pedido não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_purchase_order(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = app_state.purchase_service.get(&ctx, id).await?;
    Ok(success_with("purchaseOrder", order))
}

#[utoipa::path(
    delete,
    path = "/api/purchase-orders/{id}",
    tag = "Compras",
    params(("id" = Uuid, Path, description = "ID do pedido")),
    responses(
        (status = 200, description = "Pedido excluído e estoque retirado"),
        (status = 404, description = "Pedido não encontrado"),
        (status = 409, description = "O estoque recebido já foi consumido")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_purchase_order(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.purchase_service.delete(&ctx, id).await?;
    Ok(success())
}

#[utoipa::path(
    patch,
    path = "/api/purchase-orders/{id}/items/{item_id}",
    tag = "Compras",
    request_body = UpdatePurchaseItemInput,
    params(
        ("id" = Uuid, Path, description = "ID do pedido"),
        ("item_id" = Uuid, Path, description = "ID do item")
    ),
    responses(
        (status = 200, description = "Item alterado; estoque e total ajustados", body = PurchaseOrderDetail),
        (status = 404, description = "Pedido ou item não encontrado"),
        (status = 409, description = "Estoque insuficiente para retirar a diferença")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_purchase_item(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePurchaseItemInput>,
) -> Result<impl IntoResponse, AppError> {
    let order = app_state.purchase_service.update_item(&ctx, id, item_id, payload).await?;
    Ok(success_with("purchaseOrder", order))
}

#[utoipa::path(
    delete,
    path = "/api/purchase-orders/{id}/items/{item_id}",
    tag = "Compras",
    params(
        ("id" = Uuid, Path, description = "ID do pedido"),
        ("item_id" = Uuid, Path, description = "ID do item")
    ),
    responses(
        (status = 200, description = "Item excluído; estoque e total ajustados"),
        (status = 404, description = "Pedido ou item não encontrado"),
        (status = 409, description = "O estoque do item já foi consumido")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_purchase_item(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    app_state.purchase_service.delete_item(&ctx, id, item_id).await?;
    Ok(success())
}
