// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Identidade autenticada (vem do `sub` do JWT). A emissão do token fica fora
// deste serviço; aqui só validamos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // Subject (ID do usuário)
    pub exp: usize, // Expiration time (quando o token expira)
    pub iat: usize, // Issued At (quando o token foi criado)
}
