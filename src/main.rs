use anyhow::Result;
use predictive_irrigation::{api, config::Config, logging, state::AppState};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cfg = Config::load()?;
    let addr = cfg.server.socket_addr()?;

    let state = AppState::new(cfg).await?;
    let app = api::router(state);

    info!(%addr, "starting predictive irrigation engine");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(logging::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
