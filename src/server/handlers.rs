//! Обработчики HTTP-запросов

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use super::render::{self, ResultsView};
use super::{status_for, AppState, DOWNLOAD_FILENAME};
use crate::error::{PredictionError, Result};
use crate::preprocessing::write_csv;
use crate::store::ResultToken;
use crate::types::{ApiPredictionResponse, ErrorResponse, HealthResponse};

/// Загруженный файл из поля `file`
struct Upload {
    filename: Option<String>,
    bytes: Bytes,
}

/// Превышение `DefaultBodyLimit` приходит как ошибка чтения multipart
fn upload_error(err: MultipartError) -> PredictionError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PredictionError::UploadTooLarge(err.body_text())
    } else {
        PredictionError::Schema(err.body_text())
    }
}

async fn read_upload(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Upload> {
    let mut multipart = multipart.map_err(|_| PredictionError::MissingFile)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(upload_error)?;

        if filename.as_deref().map_or(true, str::is_empty) && bytes.is_empty() {
            return Err(PredictionError::MissingFile);
        }
        return Ok(Upload { filename, bytes });
    }

    Err(PredictionError::MissingFile)
}

fn log_failure(route: &str, err: &PredictionError) {
    if err.is_client_error() {
        warn!("{} rejected ({}): {}", route, err.kind(), err);
    } else {
        error!("{} failed ({}): {}", route, err.kind(), err);
    }
}

fn html_error(err: &PredictionError) -> Response {
    log_failure("Request", err);
    (status_for(err), Html(render::index_page(Some(err)))).into_response()
}

fn json_error(err: &PredictionError) -> Response {
    log_failure("API request", err);
    (status_for(err), Json(ErrorResponse::from(err))).into_response()
}

pub async fn index() -> Html<String> {
    Html(render::index_page(None))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: state.service.features().features.len(),
        stored_results: state.store.len().await,
    })
}

/// Загрузка CSV через форму: сводка + ссылка на скачивание
pub async fn predict(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return html_error(&e),
    };

    let is_csv = upload
        .filename
        .as_deref()
        .map_or(false, |name| name.to_ascii_lowercase().ends_with(".csv"));
    if !is_csv {
        return html_error(&PredictionError::Schema("the file must be a CSV".to_string()));
    }

    info!(
        "Predict request: {} ({} bytes)",
        upload.filename.as_deref().unwrap_or_default(),
        upload.bytes.len()
    );

    let run = match state.service.run(&upload.bytes).await {
        Ok(run) => run,
        Err(e) => return html_error(&e),
    };

    let preview = run.table.head(state.preview_rows);
    let token = state
        .store
        .insert(run.table, run.stats.clone(), run.rows_dropped)
        .await;

    Html(render::results_page(&ResultsView {
        token,
        stats: &run.stats,
        rows_dropped: run.rows_dropped,
        preview,
    }))
    .into_response()
}

/// Полная таблица результатов по токену
pub async fn download(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    let result = match ResultToken::parse(&token) {
        Ok(token) => state.store.get(&token).await,
        Err(e) => Err(e),
    };
    let result = match result {
        Ok(result) => result,
        Err(e) => return html_error(&e),
    };

    match write_csv(&result.table) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", DOWNLOAD_FILENAME),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => html_error(&e),
    }
}

/// JSON API: цены в порядке строк и сводная статистика
pub async fn api(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return json_error(&e),
    };

    info!("API predict request: {} bytes", upload.bytes.len());

    match state.service.run(&upload.bytes).await {
        Ok(run) => (
            StatusCode::OK,
            Json(ApiPredictionResponse {
                total: run.stats.total,
                descartados: run.rows_dropped,
                promedio: run.stats.average,
                minimo: run.stats.minimum,
                maximo: run.stats.maximum,
                predicciones: run.predictions.real,
            }),
        )
            .into_response(),
        Err(e) => json_error(&e),
    }
}
