use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    labloan_observability::init();

    let config = labloan_api::config::Config::from_env()?;
    let services = labloan_api::app::services::build_services(&config).await?;

    if config.seed_demo_users {
        let added = services.seed_demo_users().await?;
        if added > 0 {
            tracing::warn!(added, "seeded demo accounts with well-known passwords");
        }
    }

    let app = labloan_api::app::build_app(services);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
