// src/handlers/context.rs

use axum::response::IntoResponse;

use crate::{common::response::success_with, models::tenancy::TenantContext};

#[utoipa::path(
    get,
    path = "/api/me/context",
    tag = "Contexto",
    responses(
        (status = 200, description = "Escopo resolvido do usuário", body = TenantContext),
        (status = 401, description = "Sem perfil ou organização desativada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_context(ctx: TenantContext) -> impl IntoResponse {
    success_with("context", ctx)
}
