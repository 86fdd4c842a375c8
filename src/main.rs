use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stickerforge::app_state::AppState;
use stickerforge::config::AppConfig;
use stickerforge::orchestrator::Orchestrator;
use stickerforge::routes;
use stickerforge::services::fetch::SourceFetcher;
use stickerforge::services::generator::CopyGenerator;
use stickerforge::services::pipeline::{CompositionPipeline, PipelineConfig};
use stickerforge::services::publisher::TelegramPublisher;
use stickerforge::services::queue::JobQueue;
use stickerforge::services::render::FontRenderer;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");
    config.validate().expect("Invalid configuration");

    tracing::info!("Initializing stickerforge");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("sticker_jobs_total", "Total sticker jobs submitted");
    metrics::describe_counter!("sticker_jobs_completed", "Total sticker jobs completed");
    metrics::describe_counter!("sticker_jobs_failed", "Total sticker jobs that failed");
    metrics::describe_gauge!(
        "sticker_queue_depth",
        "Current number of waiting jobs in the queue"
    );

    // Load the overlay font
    let font_path = config
        .font_path
        .clone()
        .or_else(FontRenderer::locate_system_font)
        .expect("No usable font found; set FONT_PATH to a TTF file");
    let renderer =
        Arc::new(FontRenderer::from_path(&font_path).expect("Failed to load overlay font"));
    tracing::info!(font = %font_path.display(), "Overlay font loaded");

    // Initialize services
    let pipeline = Arc::new(
        CompositionPipeline::new(
            PipelineConfig {
                sticker_size: config.sticker_size,
                codec_quality: config.codec_quality,
                text_padding: config.text_padding,
                font_ceiling: config.font_ceiling,
                font_floor: config.font_floor,
                font_step: config.font_step,
                max_block_fraction: config.max_block_fraction,
                text_anchor: config.text_anchor,
                temp_dir: config.temp_dir.clone(),
            },
            renderer,
        )
        .expect("Failed to initialize composition pipeline"),
    );

    let generator =
        Arc::new(CopyGenerator::new(config.temp_dir.clone()).expect("Failed to initialize generator"));

    let publisher = Arc::new(TelegramPublisher::new(
        &config.bot_token,
        &config.bot_username,
    ));

    let fetcher =
        Arc::new(SourceFetcher::new(config.temp_dir.clone()).expect("Failed to initialize fetcher"));

    // Select the queue backend and install the job handler
    let queue = Arc::new(JobQueue::connect(&config).expect("Failed to initialize job queue"));
    let orchestrator = Arc::new(Orchestrator::new(
        generator,
        pipeline,
        publisher,
        config.labels.clone(),
    ));
    queue
        .register_handler(config.max_concurrent_jobs, orchestrator.into_handler())
        .await;

    let state = AppState::new(queue.clone(), fetcher);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/stickers", post(routes::stickers::submit_sticker_job))
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::export_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(queue))
        .await
        .expect("Server error");
}

/// Wire process signals to the queue's explicit close: stop admission and
/// tear the backend down without waiting for running jobs.
async fn shutdown_signal(queue: Arc<JobQueue>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, closing queue");
    queue.close().await;
}
