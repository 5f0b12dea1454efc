use anyhow::Context;
use storechat_api::{build_router, state::AppState};
use storechat_config::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("Loading configuration")?;

    let db = storechat_db::client::connect(&settings.mongo)
        .await
        .context("Connecting to MongoDB")?;
    storechat_db::indexes::ensure_indexes(&db)
        .await
        .context("Ensuring indexes")?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::new(settings, &db);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Binding {addr}"))?;
    info!(%addr, "Support chat API listening");

    axum::serve(listener, app).await.context("Serving")?;
    Ok(())
}
