//src/main.rs

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use inventory_engine::{
    config::{AppState, Config},
    routes::build_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG controla o nível; o alvo fica visível para separar `compensation`
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config).await?;
    let app = build_router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
