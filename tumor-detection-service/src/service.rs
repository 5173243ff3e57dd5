use axum::{
    Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use tumor_inference::{
    BatchConfig, BatchOrchestrator, BatchResult, Classifier, DiagnosticReport, GrowthSimulator,
    ImagePayload, InferenceError, ReportAssembler,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn inference_error(err: &InferenceError) -> ApiError {
    let status = match err {
        InferenceError::EmptyBatch
        | InferenceError::BatchTooLarge { .. }
        | InferenceError::UnsupportedFormat(_)
        | InferenceError::DecodeFailed(_)
        | InferenceError::InvalidLabel(_) => StatusCode::BAD_REQUEST,
        InferenceError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        InferenceError::InvalidClassification(_)
        | InferenceError::Classifier(_)
        | InferenceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
}

/// Build the application router around a classifier implementation.
///
/// The classifier is injected so the routes can be driven by the remote
/// model in production and by a fixed double in tests.
pub fn create_app(classifier: Arc<dyn Classifier>, config: BatchConfig) -> Router {
    let orchestrator = BatchOrchestrator::with_config(
        classifier,
        ReportAssembler::new(GrowthSimulator::new()),
        config,
    );
    build_router(AppState {
        orchestrator: Arc::new(orchestrator),
    })
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Brain Tumor Detection & Growth Forecasting API",
        "version": "1.0.0",
        "description": "Classifies MRI images and forecasts tumor growth and symptoms",
        "endpoints": {
            "POST /predict": "Upload one MRI image for tumor detection",
            "POST /predict-batch": "Upload up to 10 MRI images",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<DiagnosticReport> {
    let mut payloads = collect_payloads(multipart).await?;
    if payloads.len() != 1 {
        return Err(bad_request_error("Exactly one image file is required"));
    }
    let payload = payloads.remove(0);

    info!(filename = %payload.filename, "single image prediction requested");

    match state.orchestrator.analyze(payload).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            error!("Prediction failed: {}", e);
            Err(inference_error(&e))
        }
    }
}

async fn predict_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<BatchResult> {
    let payloads = collect_payloads(multipart).await?;

    let request_id = Uuid::new_v4();
    info!(%request_id, batch_size = payloads.len(), "batch prediction requested");

    match state.orchestrator.run_batch(payloads).await {
        Ok(result) => {
            info!(
                %request_id,
                succeeded = result.succeeded,
                failed = result.failed,
                "batch prediction finished"
            );
            Ok(Json(result))
        }
        Err(e) => {
            error!(%request_id, "Batch prediction rejected: {}", e);
            Err(inference_error(&e))
        }
    }
}

async fn collect_payloads(mut multipart: Multipart) -> Result<Vec<ImagePayload>, ApiError> {
    let mut payloads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("Malformed multipart request: {e}")))?
    {
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}", payloads.len()));

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request_error(&format!("Failed to read uploaded file: {e}")))?;

        payloads.push(ImagePayload::new(filename, bytes.to_vec()));
    }

    if payloads.is_empty() {
        return Err(bad_request_error("No file provided"));
    }

    Ok(payloads)
}
