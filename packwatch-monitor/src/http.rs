/**
 * API REST PACKWATCH - Vue JSON du moniteur de pack
 *
 * RÔLE :
 * Expose l'état du Dashboard à n'importe quel front léger (cartes cellules,
 * résumé pack, historique, connexion, notifications, panneaux advisory).
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, état unique `AppState` partagé par tous les handlers
 * - Lecture : /cells, /pack, /history, /dashboard, /connection, /notifications
 * - /cells/stream : SSE, un événement par changement réel du tableau
 * - Actions : /refresh, /connect, /settings (POST), /advisory/diagnostic, /advisory/advice, /advisory/predictive
 * - Erreurs de validation -> 422 avec message, exécution déjà en cours -> 409
 */

use crate::advisory::AdvisoryError;
use crate::dashboard::Dashboard;
use crate::settings::{Settings, SettingsError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

#[derive(Debug, Default, Deserialize)]
struct AdvisoryParams {
    #[serde(default)]
    user_context: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/cells", get(get_cells))
        .route("/cells/stream", get(stream_cells))
        .route("/cells/{cell}", get(get_cell))
        .route("/pack", get(get_pack))
        .route("/history", get(get_history))
        .route("/dashboard", get(get_dashboard))
        .route("/connection", get(get_connection))
        .route("/notifications", get(get_notifications))
        .route("/settings", get(get_settings).post(save_settings))
        .route("/refresh", post(refresh))
        .route("/connect", post(connect))
        .route("/advisory", get(get_advisory))
        .route("/advisory/diagnostic", post(run_diagnostic))
        .route("/advisory/advice", post(run_advice))
        .route("/advisory/predictive", post(run_predictive))
        .route("/download", get(download))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.health())
}

// GET /cells (cartes + fraîcheur)
async fn get_cells(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.cells())
}

// GET /cells/stream : état courant puis chaque changement effectif
async fn stream_cells(State(app): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = app.dashboard.subscribe();
    receiver.mark_changed();
    let stream = futures::stream::unfold((receiver, app.dashboard), |(mut receiver, dashboard)| async move {
        // sender fermé : fin du flux
        receiver.changed().await.ok()?;
        let event = Event::default()
            .json_data(dashboard.cells())
            .unwrap_or_else(|_| Event::default().comment("unserializable cells view"));
        Some((Ok(event), (receiver, dashboard)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// GET /cells/{cell} (détail + stats historiques)
async fn get_cell(State(app): State<AppState>, Path(cell): Path<u32>) -> Response {
    match app.dashboard.cell_detail(cell) {
        Some(detail) => Json(detail).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_pack(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.pack_summary())
}

async fn get_history(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.history())
}

async fn get_dashboard(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.dashboard_stats())
}

async fn get_connection(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.connection())
}

async fn get_notifications(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.notifications())
}

async fn get_settings(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.settings())
}

// POST /settings (validé avant écriture)
async fn save_settings(State(app): State<AppState>, Json(settings): Json<Settings>) -> Response {
    match app.dashboard.save_settings(settings).await {
        Ok(()) => Json(json!({ "ok": true, "settings": settings })).into_response(),
        Err(e @ (SettingsError::InvalidThresholds | SettingsError::InvalidInterval)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "ok": false, "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false, "error": e.to_string() }))).into_response()
        }
    }
}

// POST /refresh
async fn refresh(State(app): State<AppState>) -> impl IntoResponse {
    app.dashboard.refresh().await;
    Json(app.dashboard.connection())
}

// POST /connect (nouveau lien live + sonde matérielle)
async fn connect(State(app): State<AppState>) -> impl IntoResponse {
    let status = app.dashboard.connect().await;
    Json(json!({ "status": status }))
}

async fn get_advisory(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.dashboard.advisory_view())
}

async fn run_diagnostic(State(app): State<AppState>, params: Option<Json<AdvisoryParams>>) -> Response {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    advisory_response(app.dashboard.run_diagnostic(params.user_context).await)
}

async fn run_advice(State(app): State<AppState>, params: Option<Json<AdvisoryParams>>) -> Response {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    advisory_response(app.dashboard.run_advice(params.user_context).await)
}

async fn run_predictive(State(app): State<AppState>) -> Response {
    advisory_response(app.dashboard.run_predictive().await)
}

/// L'union succès/erreur part toujours en 200 ; seul "déjà en cours" est un 409
fn advisory_response<T: serde::Serialize>(
    outcome: Result<crate::advisory::AdvisoryResult<T>, AdvisoryError>,
) -> Response {
    match outcome {
        Ok(result) => Json(result).into_response(),
        Err(e) => (StatusCode::CONFLICT, Json(json!({ "success": false, "error": e.to_string() }))).into_response(),
    }
}

// GET /download -> CSV servi directement par le backend
async fn download(State(app): State<AppState>) -> Response {
    match app.dashboard.download_url() {
        Some(url) => Redirect::temporary(&url).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Backend API URL is not configured." })),
        )
            .into_response(),
    }
}
