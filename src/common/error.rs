use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{common::validation::flatten_messages, db::StoreError};

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Não autorizado")]
    Unauthorized,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // Usuário sem organização/filial onde uma é obrigatória (problema de cadastro)
    #[error("Erro de configuração: {0}")]
    Configuration(String),

    #[error("Estoque insuficiente do produto {product_id} no armazém {warehouse_id}: disponível {available}, solicitado {requested}")]
    InsufficientStock {
        product_id: Uuid,
        warehouse_id: Uuid,
        available: i32,
        requested: i32,
    },

    // Mesmo erro para "não existe" e "existe em outro tenant"
    #[error("{0} não encontrado(a)")]
    NotFoundInScope(&'static str),

    #[error("Exclusão bloqueada: {0}")]
    Blocked(String),

    #[error("Erro de banco de dados: {0}")]
    Store(#[from] StoreError),

    // A compensação falhou e deixou linhas órfãs. O erro original é o que o
    // usuário vê; as ações pendentes vão para o log.
    #[error("Falha na compensação após: {source}")]
    CompensationFailure {
        source: Box<AppError>,
        pending: Vec<String>,
    },

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// O erro que deve ser mostrado ao usuário final.
    pub fn user_facing(&self) -> &AppError {
        match self {
            AppError::CompensationFailure { source, .. } => source.user_facing(),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.user_facing() {
            AppError::Unauthorized | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock { .. } | AppError::Blocked(_) => StatusCode::CONFLICT,
            AppError::NotFoundInScope(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Corpo padrão de erro: { "error": "...", "details": [...] }
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.user_facing() {
            AppError::ValidationError(errors) => ApiError {
                error: "Um ou mais campos são inválidos.".into(),
                details: Some(flatten_messages(errors)),
            },
            AppError::Unauthorized => ApiError {
                error: "Não autorizado.".into(),
                details: None,
            },
            AppError::InvalidToken => ApiError {
                error: "Token de autenticação inválido ou ausente.".into(),
                details: None,
            },
            AppError::InsufficientStock { product_id, warehouse_id, available, requested } => ApiError {
                error: "Estoque insuficiente.".into(),
                details: Some(vec![
                    format!("productId: {}", product_id),
                    format!("warehouseId: {}", warehouse_id),
                    format!("available: {}", available),
                    format!("requested: {}", requested),
                ]),
            },
            e @ AppError::NotFoundInScope(_) => ApiError {
                error: e.to_string(),
                details: None,
            },
            AppError::Blocked(reason) => ApiError {
                error: reason.clone(),
                details: None,
            },
            e @ AppError::Store(_) => {
                tracing::error!("Erro de banco de dados: {}", e);
                ApiError { error: "Erro de banco de dados.".into(), details: None }
            }
            // Configuration, InternalServerError...
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                ApiError { error: "Ocorreu um erro inesperado.".into(), details: None }
            }
        };

        (status, Json(body)).into_response()
    }
}
