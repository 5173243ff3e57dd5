use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tumor_detection_service::{RemoteClassifier, create_app};
use tumor_inference::BatchConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let classifier_url = match std::env::var("CLASSIFIER_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Error: CLASSIFIER_URL environment variable is required");
            std::process::exit(1);
        }
    };

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let config = batch_config_from_env();
    let classifier = Arc::new(RemoteClassifier::new(classifier_url));
    let app = create_app(classifier, config);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let addr = listener.local_addr()?;

    info!("Tumor Detection Service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Prediction endpoint: POST http://{}/predict", addr);
    info!("Batch endpoint: POST http://{}/predict-batch", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn batch_config_from_env() -> BatchConfig {
    let mut config = BatchConfig::default();

    if let Ok(ms) = std::env::var("BATCH_TIMEOUT_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            config.timeout = Some(Duration::from_millis(ms));
        }
    }
    if let Ok(workers) = std::env::var("BATCH_CONCURRENCY") {
        if let Ok(workers) = workers.parse::<usize>() {
            config.max_concurrency = workers.max(1);
        }
    }

    config
}
