// src/models/tenancy.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Papel que dá visibilidade global (sem organização/filial fixa).
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

// ---
// 1. Organization (O "Tenant" raiz)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Uuid,
    #[schema(example = "Distribuidora Central")]
    pub name: String,
    pub active: bool,
}

// ---
// 2. Branch (A "Filial")
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[schema(example = "Filial Centro")]
    pub name: String,
    pub location: Option<String>,
}

// ---
// 3. Perfil do usuário (tabela `profiles` + nomes via JOIN)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub role: String,
    pub organization_name: Option<String>,
    pub organization_active: Option<bool>,
    pub branch_name: Option<String>,
}

// ---
// 4. TenantContext (o escopo do chamador, resolvido a cada requisição)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub user_id: Uuid,
    pub is_super_admin: bool,
    pub organization_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub organization_name: Option<String>,
    pub branch_name: Option<String>,
}

impl TenantContext {
    pub fn from_profile(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            is_super_admin: profile.role == SUPER_ADMIN_ROLE,
            organization_id: profile.organization_id,
            branch_id: profile.branch_id,
            organization_name: profile.organization_name,
            branch_name: profile.branch_name,
        }
    }
}

// Filtro explícito das listagens. Para usuários comuns só restringe;
// para o super-admin escolhe o escopo consultado.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ScopeFilter {
    pub organization_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
}
