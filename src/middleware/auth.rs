// src/middleware/auth.rs

use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    config::AppState,
    models::auth::{Claims, Identity},
};

/// Valida o JWT (HS256) e devolve a identidade do `sub`.
pub fn validate_token(token: &str, secret: &str) -> Result<Identity, AppError> {
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &Validation::default())
        .map_err(|e| {
            tracing::debug!(error = %e, "Token rejeitado");
            AppError::InvalidToken
        })?;
    Ok(Identity { user_id: token_data.claims.sub })
}

// Extrator para obter o usuário autenticado diretamente nos handlers
pub struct AuthenticatedUser(pub Identity);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::InvalidToken)?;

        validate_token(bearer.token(), &state.jwt_secret).map(AuthenticatedUser)
    }
}
