use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use mx_storefront as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let host = cfg.host.clone();
    let port = cfg.port;
    let sync_interval = cfg.sync_interval();
    let app_state = api::AppState::from_config(cfg).context("failed to build application state")?;

    // Push records the document store missed back out periodically
    if let (true, Some(period)) = (app_state.store.has_remote(), sync_interval) {
        let store = app_state.store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = store.sync().await;
                if report.failed > 0 {
                    warn!(synced = report.synced, failed = report.failed, "Background sync incomplete");
                } else if report.synced > 0 {
                    info!(synced = report.synced, "Background sync pushed pending records");
                }
            }
        });
    }

    let app = api::build_app(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", host, port))?;
    info!("mx-storefront listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
