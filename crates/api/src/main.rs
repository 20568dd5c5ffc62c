use anyhow::Result;
use tracko_api::{build_app, ApiConfig};
use tracko_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("tracko_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();

    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "tracko api started");

    axum::serve(listener, app).await?;
    Ok(())
}
