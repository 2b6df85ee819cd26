/**
 * PACKWATCH MONITOR - Point d'entrée du moniteur de pack batterie
 *
 * RÔLE : Charge la config, monte le dashboard (lien live + fetch complet),
 * sert l'API JSON et démonte proprement à l'arrêt (Ctrl-C).
 *
 * ARCHITECTURE : backend HTTP/SSE -> Reconciler -> classification -> API REST.
 * Le service advisory est optionnel (diagnostic, conseils, alertes prédictives).
 *
 * USAGE :
 *   packwatch-monitor                 # moniteur + API JSON
 *   packwatch-monitor export <fichier> # sauvegarde le CSV d'historique du backend
 */

mod advisory;
mod backend;
mod config;
mod connection;
mod dashboard;
mod health;
mod history;
mod http;
mod live;
mod models;
mod notify;
mod reconcile;
mod settings;
mod sse;
mod state;
mod summary;
mod thresholds;

use crate::backend::BackendClient;
use crate::config::{load_config, MonitorConfig};
use crate::dashboard::Dashboard;
use crate::http::AppState;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("packwatch_monitor=info")),
        )
        .init();

    let cfg = load_config().await;
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, dest] = args.as_slice() {
        if command == "export" {
            return export_csv(&cfg, PathBuf::from(dest)).await;
        }
    }

    let addr: SocketAddr = cfg
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {:?}", cfg.listen))?;
    tokio::fs::create_dir_all(&cfg.data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", cfg.data_dir))?;

    info!(
        "[packwatch] {} cells, backend {}, advisory {}, live mode {:?}",
        cfg.cell_count,
        cfg.backend_base().as_deref().unwrap_or("<not configured>"),
        cfg.advisory_base().as_deref().unwrap_or("<not configured>"),
        cfg.live_mode
    );

    let dashboard = Arc::new(Dashboard::from_config(cfg));
    dashboard.mount().await;

    let app = http::build_router(AppState { dashboard: dashboard.clone() });
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[packwatch] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("http server failed")?;

    dashboard.unmount();
    info!("[packwatch] stopped");
    Ok(())
}

async fn export_csv(cfg: &MonitorConfig, dest: PathBuf) -> Result<()> {
    let base = cfg
        .backend_base()
        .context("backend URL is not configured (PACKWATCH_BACKEND_URL)")?;
    let bytes = BackendClient::new(base).save_csv(&dest).await?;
    info!("[packwatch] {bytes} bytes written to {}", dest.display());
    Ok(())
}
