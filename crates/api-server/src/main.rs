use std::net::SocketAddr;
use std::sync::Arc;

use api_server::http::{AppState, build_router};
use shared::assistant::GlpAssistant;
use shared::config::{ApiConfig, load_dotenv};
use shared::llm::{ChatCompletionsGateway, LlmGateway};
use shared::profile::ProfileExtractor;
use shared::vision::{FoodAnalyzer, HuggingFaceZeroShotClassifier, ImageClassifier};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let dotenv_result = load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_server=info,shared=info,tower_http=info".to_string()),
        )
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .init();

    if let Err(err) = dotenv_result {
        error!("failed to load environment: {err}");
        std::process::exit(1);
    }

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let assistant_gateway: Arc<dyn LlmGateway> =
        match ChatCompletionsGateway::new(config.perplexity) {
            Ok(gateway) => {
                info!(model = gateway.model(), "assistant gateway ready");
                Arc::new(gateway)
            }
            Err(err) => {
                error!("failed to initialize assistant gateway: {err}");
                std::process::exit(1);
            }
        };

    let vision_gateway: Arc<dyn LlmGateway> = match ChatCompletionsGateway::new(config.openai) {
        Ok(gateway) => {
            info!(model = gateway.model(), "vision gateway ready");
            Arc::new(gateway)
        }
        Err(err) => {
            error!("failed to initialize vision gateway: {err}");
            std::process::exit(1);
        }
    };

    let classifier: Option<Arc<dyn ImageClassifier>> = match config.zero_shot {
        Some(zero_shot) => match HuggingFaceZeroShotClassifier::new(zero_shot) {
            Ok(classifier) => Some(Arc::new(classifier)),
            Err(err) => {
                error!("failed to initialize image classifier: {err}");
                std::process::exit(1);
            }
        },
        None => {
            info!("HF_API_KEY not set; food analysis runs without zero-shot classification");
            None
        }
    };

    let app = build_router(AppState {
        assistant: Arc::new(GlpAssistant::new(assistant_gateway, config.assistant)),
        analyzer: Arc::new(FoodAnalyzer::new(
            vision_gateway.clone(),
            classifier,
            config.max_image_dimension,
        )),
        profiles: Arc::new(ProfileExtractor::new(vision_gateway)),
        allowed_origins: config.cors_allowed_origins,
        max_upload_bytes: config.max_upload_bytes,
    });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid API_BIND_ADDR '{}': {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server terminated: {err}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
