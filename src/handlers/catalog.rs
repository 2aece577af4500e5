// src/handlers/catalog.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    common::{error::AppError, response::success},
    config::AppState,
    models::tenancy::TenantContext,
};

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    tag = "Cadastros",
    params(("id" = Uuid, Path, description = "ID da categoria")),
    responses(
        (status = 200, description = "Categoria excluída"),
        (status = 404, description = "Categoria não encontrada"),
        (status = 409, description = "A categoria possui produtos")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_category(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.catalog_service.delete_category(&ctx, id).await?;
    Ok(success())
}

#[utoipa::path(
    delete,
    path = "/api/warehouses/{id}",
    tag = "Cadastros",
    params(("id" = Uuid, Path, description = "ID do armazém")),
    responses(
        (status = 200, description = "Armazém excluído"),
        (status = 404, description = "Armazém não encontrado"),
        (status = 409, description = "O armazém possui saldos de estoque")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_warehouse(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.catalog_service.delete_warehouse(&ctx, id).await?;
    Ok(success())
}
