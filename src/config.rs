// src/config.rs

use std::{env, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;

use crate::{
    db::{memory_store::Tables, MemoryStore, PgStore, Store},
    services::{
        catalog_service::CatalogService, invalidation::Invalidation, movement_service::MovementService,
        orchestrator::CompensationSettings, purchase_service::PurchaseService, sale_service::SaleService,
        stock_service::StockService, tenancy_service::TenantService,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("STORE_BACKEND desconhecido: {}", other),
        }
    }
}

// Configuração lida do ambiente (.env carregado antes)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub store_backend: StoreBackend,
    pub memory_seed_path: Option<PathBuf>,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub compensation: CompensationSettings,
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} inválido ({}): {}", name, raw, e)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        let store_backend = parsed("STORE_BACKEND", StoreBackend::Postgres)?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL deve ser definida para o backend postgres");
        }

        Ok(Self {
            database_url,
            jwt_secret,
            store_backend,
            memory_seed_path: env::var("MEMORY_SEED_PATH").ok().map(PathBuf::from),
            bind_addr: parsed("BIND_ADDR", "0.0.0.0:3000".to_string())?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout: Duration::from_secs(parsed("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
            compensation: CompensationSettings::new(
                parsed("COMPENSATION_MAX_ATTEMPTS", 3)?,
                Duration::from_millis(parsed("COMPENSATION_RETRY_DELAY_MS", 50)?),
            ),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: String,
    pub invalidation: Invalidation,
    pub tenant_service: TenantService,
    pub sale_service: SaleService,
    pub purchase_service: PurchaseService,
    pub movement_service: MovementService,
    pub stock_service: StockService,
    pub catalog_service: CatalogService,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config.database_url.as_deref().context("DATABASE_URL ausente")?;
                let store = PgStore::connect(url, config.db_max_connections, config.db_acquire_timeout)
                    .await
                    .context("Falha ao conectar ao banco de dados")?;
                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                store.migrate().await.context("Falha ao rodar as migrações do banco de dados")?;
                tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
                Arc::new(store)
            }
            StoreBackend::Memory => {
                let store = match &config.memory_seed_path {
                    Some(path) => MemoryStore::from_file(path)?,
                    None => MemoryStore::new(Tables::default()),
                };
                tracing::warn!("Usando o store em memória (os dados não são persistidos)");
                Arc::new(store)
            }
        };

        Ok(Self::with_store(store, config.jwt_secret.clone(), config.compensation))
    }

    // --- Monta o gráfico de dependências ---
    pub fn with_store(store: Arc<dyn Store>, jwt_secret: String, settings: CompensationSettings) -> Self {
        let invalidation = Invalidation::default();
        Self {
            jwt_secret,
            tenant_service: TenantService::new(store.clone()),
            sale_service: SaleService::new(store.clone(), invalidation.clone(), settings),
            purchase_service: PurchaseService::new(store.clone(), invalidation.clone(), settings),
            movement_service: MovementService::new(store.clone(), invalidation.clone(), settings),
            stock_service: StockService::new(store.clone(), invalidation.clone()),
            catalog_service: CatalogService::new(store, invalidation.clone()),
            invalidation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }
}
