/// API сервер для предсказания цен на дома

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use house_price_ml::{
    server::{create_router, AppState},
    AppConfig, PricePipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    // Загрузка обученного конвейера
    let pipeline = PricePipeline::load(&config.model.artifact_path)
        .with_context(|| format!("failed to load pipeline from {}", config.model.artifact_path))?;
    pipeline.check_target_transform(config.model.target_transform)?;

    let state = AppState::new(&config, Arc::new(pipeline));
    let app = create_router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.address))?;
    tracing::info!("Server listening on http://{}", config.server.address);
    axum::serve(listener, app).await?;

    Ok(())
}
