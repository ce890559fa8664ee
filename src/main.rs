use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use fashion_consult::consult::embeddings::EmbeddingClient;
use fashion_consult::consult::intent::IntentClient;
use fashion_consult::consult::vector_store::GarmentIndex;
use fashion_consult::consult::{resolve_intent, ConsultingEngine};
use fashion_consult::error::ServiceError;
use fashion_consult::models::{ConsultRequest, ConsultResponse};

struct AppState {
    intent: IntentClient,
    engine: ConsultingEngine<EmbeddingClient, GarmentIndex>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ロギング初期化
    tracing_subscriber::fmt::init();

    // 環境変数読み込み
    dotenv::dotenv().ok();
    let qdrant_url =
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
    let llm_url = std::env::var("LLM_URL").unwrap_or_else(|_| "http://localhost:4000".to_string());
    let llm_api_key = std::env::var("LLM_API_KEY").ok();
    let intent_model =
        std::env::var("INTENT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let embedding_model =
        std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-004".to_string());
    let embedding_dim: usize = std::env::var("EMBEDDING_DIM")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(768);
    let search_breadth: u64 = std::env::var("SEARCH_BREADTH")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(16);

    tracing::info!("Connecting to Qdrant: {}", qdrant_url);
    tracing::info!("Connecting to LLM gateway: {}", llm_url);

    // コンポーネント初期化
    let index = GarmentIndex::connect(&qdrant_url, embedding_dim as u64, search_breadth)
        .await
        .map_err(|e| anyhow::anyhow!("vector index init failed: {e}"))?;
    let embeddings = EmbeddingClient::new(
        llm_url.clone(),
        llm_api_key.clone(),
        embedding_model,
        embedding_dim,
    );
    let intent = IntentClient::new(llm_url, llm_api_key, intent_model);

    let state = Arc::new(AppState {
        intent,
        engine: ConsultingEngine::new(embeddings, index),
    });

    // CORS設定
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // ルーター設定
    let app = Router::new()
        .route("/api/v1/consult", post(consult_handler))
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("Consulting server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn consult_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConsultRequest>,
) -> Result<Json<ConsultResponse>, (StatusCode, String)> {
    let request_id = Uuid::new_v4();

    if request.prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, ServiceError::EmptyInput.to_string()));
    }

    // 1. 構造化インテント解析
    let analysis = state
        .intent
        .analyze(&request.prompt)
        .await
        .map_err(|e| {
            tracing::error!("Intent analysis failed for request {}: {}", request_id, e);
            (StatusCode::BAD_GATEWAY, format!("Intent error: {e}"))
        })?;

    tracing::info!(
        "Request {} analyzed into {} parts",
        request_id,
        analysis.parts.len()
    );

    // 2. パート毎の検索（失敗は各パートに隔離される）
    let intent = resolve_intent(analysis, request.gender, request.seasons);
    let parts = state.engine.consult(&intent).await;

    Ok(Json(ConsultResponse {
        greeting: intent.greeting,
        parts,
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let llm_healthy = state.intent.health_check().await.unwrap_or(false);

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "llm": llm_healthy
        }
    }))
}
