use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flockquiz::{
    api, broadcast,
    config::ServerConfig,
    questions::HttpQuestionRepository,
    semantic::HttpSemanticMatcher,
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flockquiz=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting flockquiz...");

    let config = ServerConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let mut state = AppState::with_config(config.clone());

    match config.question_repository_url.clone() {
        Some(url) => match HttpQuestionRepository::new(url.clone(), config.upstream_timeout) {
            Ok(repository) => {
                tracing::info!("Question repository: {}", url);
                state = state.with_question_repository(Arc::new(repository));
            }
            Err(e) => tracing::warn!(
                "Failed to initialize question repository: {}. Built-in prompts will be used.",
                e
            ),
        },
        None => tracing::info!("No QUESTION_REPOSITORY_URL set, using built-in prompts"),
    }

    if let Some(url) = config.semantic_matcher_url.clone() {
        match HttpSemanticMatcher::new(url.clone(), config.upstream_timeout) {
            Ok(matcher) => {
                tracing::info!("Semantic matcher: {}", url);
                state = state.with_semantic_matcher(Arc::new(matcher));
            }
            Err(e) => tracing::warn!(
                "Failed to initialize semantic matcher: {}. Fuzzy matching only.",
                e
            ),
        }
    }

    let state = Arc::new(state);

    // Expire dropped seats and abandoned sessions
    broadcast::spawn_session_reaper(state.clone());

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
