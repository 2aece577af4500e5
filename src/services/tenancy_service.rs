// src/services/tenancy_service.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::Store,
    models::{auth::Identity, tenancy::TenantContext},
};

#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn Store>,
}

impl TenantService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve o escopo do chamador a partir do perfil.
    /// `None` = sem perfil ou organização desativada; o chamador trata como
    /// não autorizado. Consulta o store a cada chamada (sem cache).
    pub async fn resolve(&self, identity: &Identity) -> Result<Option<TenantContext>, AppError> {
        let Some(profile) = self.store.find_profile(identity.user_id).await? else {
            tracing::debug!(user_id = %identity.user_id, "Usuário sem perfil");
            return Ok(None);
        };

        if profile.organization_active == Some(false) {
            tracing::info!(
                user_id = %identity.user_id,
                organization_id = ?profile.organization_id,
                "Organização desativada; acesso negado"
            );
            return Ok(None);
        }

        Ok(Some(TenantContext::from_profile(profile)))
    }
}
