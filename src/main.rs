use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

mod app;
mod error_mapping;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    towercam_core::init()?;

    let (config, _validation) = towercam_core::Config::load_validated()?;
    let app = Arc::new(app::App::from_config(&config)?);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let (bound, serving) = warp::serve(server::routes(app))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Towercam listening on http://{}", bound);
    serving.await;

    tracing::info!("Towercam shut down");
    Ok(())
}
