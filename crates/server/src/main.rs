//! prerender server entry point.
//!
//! Serves the static application directory behind the prerender middleware.
//! Logs are JSON on stderr.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use prerender_client::RendererPool;
use prerender_core::{AppConfig, HtmlCache};
use prerender_server::{Prerender, router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let cache = HtmlCache::open(&config).await.context("failed to open html cache")?;
    let pool = launch_pool(&config).await?;
    let prerender = Prerender::new(&config, cache, pool)?;

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(
        addr = %config.listen_addr,
        static_dir = %config.static_dir.display(),
        admin_enabled = config.admin_enabled,
        "Starting prerender server"
    );

    axum::serve(listener, router(&config, prerender.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    prerender.shutdown().await;
    tracing::info!("prerender server stopped");

    Ok(())
}

#[cfg(feature = "render")]
async fn launch_pool(config: &AppConfig) -> Result<RendererPool> {
    use prerender_client::{HeadlessRenderer, Renderer};

    RendererPool::launch(config.renderer_instances, move |index| async move {
        tracing::debug!(index, "launching headless browser");
        HeadlessRenderer::launch(config)
            .await
            .map(|renderer| Box::new(renderer) as Box<dyn Renderer>)
    })
    .await
    .context("failed to launch renderer pool")
}

#[cfg(not(feature = "render"))]
async fn launch_pool(_config: &AppConfig) -> Result<RendererPool> {
    anyhow::bail!("built without the `render` feature; no renderer available")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
