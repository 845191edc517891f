pub mod auth;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod pipeline;
pub mod response;
pub mod state;
pub mod time;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use content::ContentModule;
use state::AppState;

/// Build the full application router over an injected state bundle.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/articles", handlers::module_router(ContentModule::Article))
        .nest("/api/threads", handlers::module_router(ContentModule::Thread))
        .nest("/api/guides", handlers::module_router(ContentModule::Guide))
        .nest("/api/catalog", handlers::module_router(ContentModule::Catalog))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Commons API",
            "version": version,
            "description": "Community content platform API built with Rust (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "articles": "/api/articles[/:slug] (list/read public, write protected)",
                "threads": "/api/threads[/:slug][/replies] (list/read public, write protected)",
                "guides": "/api/guides[/:slug] (list/read public, write protected)",
                "catalog": "/api/catalog[/:slug] (list/read public, write protected)",
                "interactions": "/api/<module>/:slug/interactions (protected)",
                "categories": "/api/<module>/categories (public)",
                "stats": "/api/<module>/stats (public)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = state.clock.now();

    match state.gateway.health().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": { "message": "content store unavailable" },
                "status": 503,
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "store_error": e.to_string()
                }
            })),
        ),
    }
}
