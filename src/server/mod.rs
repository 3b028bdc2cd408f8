//! HTTP-сервер: HTML-форма, скачивание результатов и JSON API

mod handlers;
pub mod render;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::PredictionError;
use crate::models::{InferenceAdapter, Predictor};
use crate::service::PredictionService;
use crate::store::ResultStore;

pub use handlers::{api, download, health, index, predict};

/// Имя файла при скачивании
pub const DOWNLOAD_FILENAME: &str = "predicciones_casas.csv";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub store: Arc<ResultStore>,
    pub preview_rows: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, predictor: Arc<dyn Predictor>) -> Self {
        let adapter = InferenceAdapter::new(predictor, config.model.target_transform);
        Self {
            service: Arc::new(PredictionService::new(
                config.features.clone(),
                adapter,
                config.inference.clone(),
            )),
            store: Arc::new(ResultStore::new(
                config.results.ttl_secs,
                config.results.capacity,
            )),
            preview_rows: config.results.preview_rows,
        }
    }
}

/// HTTP-статус для каждого типа ошибки
pub fn status_for(err: &PredictionError) -> StatusCode {
    match err {
        PredictionError::MissingFile
        | PredictionError::MissingColumns { .. }
        | PredictionError::Schema(_) => StatusCode::BAD_REQUEST,
        PredictionError::UploadTooLarge(_) | PredictionError::TooManyRows { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        PredictionError::NoResultAvailable(_) => StatusCode::NOT_FOUND,
        PredictionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PredictionError::Inference(_)
        | PredictionError::Config(_)
        | PredictionError::Artifact(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/download/:token", get(download))
        .route("/api", post(api))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
