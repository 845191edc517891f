use std::net::SocketAddr;
use std::sync::Arc;

use commons_api::config::AppConfig;
use commons_api::gateway::memory::MemoryGateway;
use commons_api::gateway::postgres::PostgresGateway;
use commons_api::gateway::ContentGateway;
use commons_api::state::AppState;
use commons_api::time::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commons_api=debug,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting Commons API in {:?} mode", config.environment);

    let clock = Arc::new(SystemClock);

    // Postgres when DATABASE_URL is set, otherwise the in-memory store for
    // database-free development.
    let gateway: Arc<dyn ContentGateway> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pg = PostgresGateway::connect(&url, &config.database, clock.clone()).await?;
            pg.ensure_schema().await?;
            tracing::info!("Connected to Postgres content store");
            Arc::new(pg)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory content store");
            Arc::new(MemoryGateway::new(clock.clone()))
        }
    };

    let state = AppState::new(config, gateway, clock);
    let app = commons_api::app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("COMMONS_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Commons API listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
