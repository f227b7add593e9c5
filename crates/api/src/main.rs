use anyhow::Context;

use tourbook_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tourbook_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let port = config.port;
    tracing::info!(environment = %config.environment, "starting tourbook");

    let app = tourbook_api::app::build_app(config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
