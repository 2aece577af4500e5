// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    common::error::AppError, config::AppState, middleware::auth::AuthenticatedUser,
    models::tenancy::TenantContext,
};

// O escopo do chamador, resolvido a cada requisição a partir do token.
// Sem perfil (ou organização desativada) = não autorizado.
impl FromRequestParts<AppState> for TenantContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(identity) = AuthenticatedUser::from_request_parts(parts, state).await?;

        state.tenant_service.resolve(&identity).await?.ok_or(AppError::Unauthorized)
    }
}
