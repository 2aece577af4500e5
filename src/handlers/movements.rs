// src/handlers/movements.rs

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
        inventory::{MovementInput, StockMovement},
        tenancy::{ScopeFilter, TenantContext},
    },
};

#[utoipa::path(
    post,
    path = "/api/stock-movements",
    tag = "Movimentações",
    request_body = MovementInput,
    responses(
        (status = 201, description = "Movimentação registrada", body = StockMovement),
        (status = 400, description = "Dados inválidos (origem/destino)"),
        (status = 409, description = "Estoque insuficiente na origem")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_movement(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<MovementInput>,
) -> Result<impl IntoResponse, AppError> {
    let movement = app_state.movement_service.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, success_with("movement", movement)))
}

#[utoipa::path(
    get,
    path = "/api/stock-movements",
    tag = "Movimentações",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Movimentações do escopo", body = Vec<StockMovement>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_movements(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(filter): Query<ScopeFilter>,
) -> Result<impl IntoResponse, AppError> {
    let movements = app_state.movement_service.list(&ctx, &filter).await?;
    Ok(success_with("movements", movements))
}

#[utoipa::path(
    put,
    path = "/api/stock-movements/{id}",
    tag = "Movimentações",
    request_body = MovementInput,
    params(("id" = Uuid, Path, description = "ID da movimentação")),
    responses(
        (status = 200, description = "Movimentação substituída; estoque ajustado", body = StockMovement),
        (status = 404, description = "Movimentação não encontrada"),
        (status = 409, description = "Estoque insuficiente na nova origem")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_movement(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<MovementInput>,
) -> Result<impl IntoResponse, AppError> {
    let movement = app_state.movement_service.update(&ctx, id, payload).await?;
    Ok(success_with("movement", movement))
}

#[utoipa::path(
    delete,
    path = "/api/stock-movements/{id}",
    tag = "Movimentações",
    params(("id" = Uuid, Path, description = "ID da movimentação")),
    responses(
        (status = 200, description = "Movimentação excluída; efeito revertido"),
        (status = 404, description = "Movimentação não encontrada"),
        (status = 409, description = "O destino não tem mais o saldo a reverter")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_movement(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.movement_service.delete(&ctx, id).await?;
    Ok(success())
}
