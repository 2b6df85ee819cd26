/*!
Stub du service advisory (diagnostic, conseils, alertes prédictives)

Réponses figées par route, délai optionnel pour simuler une génération lente,
et enregistrement des corps de requête pour les assertions.
*/

use crate::backend_stub::Reply;
use anyhow::Result;
use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const DIAGNOSTIC_PATH: &str = "/diagnostic-report";
pub const ADVICE_PATH: &str = "/usage-advice";
pub const PREDICTIVE_PATH: &str = "/predictive-alerts";

#[derive(Debug, Clone)]
pub struct AdvisoryFixture {
    pub diagnostic: Reply,
    pub advice: Reply,
    pub predictive: Reply,
    pub delay: Duration,
}

impl Default for AdvisoryFixture {
    fn default() -> Self {
        Self {
            diagnostic: Reply::ok(json!({
                "report_summary": "Cell 2 sits below the pack average; the rest of the pack is balanced.",
                "detailed_anomalies": [{
                    "cell": 2,
                    "issue": "Cell Imbalance",
                    "potential_causes": "Higher self-discharge or a weak connection on AIN1.",
                    "recommended_action": "Balance-charge the pack and re-check cell 2."
                }]
            })),
            advice: Reply::ok(json!({
                "advice": "Keep cells between 3.7V and 4.1V for storage and avoid deep discharge."
            })),
            predictive: Reply::ok(json!({
                "alerts": [{
                    "cell": 1,
                    "message": "Cell 1 voltage trending down faster than its neighbours.",
                    "severity": "warning"
                }]
            })),
            delay: Duration::ZERO,
        }
    }
}

impl AdvisoryFixture {
    /// Toutes les routes répondent avec ce code d'erreur
    pub fn failing(status: u16) -> Self {
        let body = json!({ "error": "model backend unavailable" });
        Self {
            diagnostic: Reply::with_status(status, body.clone()),
            advice: Reply::with_status(status, body.clone()),
            predictive: Reply::with_status(status, body),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_diagnostic(mut self, reply: Reply) -> Self {
        self.diagnostic = reply;
        self
    }
}

#[derive(Clone)]
struct AdvisoryState {
    fixture: Arc<AdvisoryFixture>,
    requests: Arc<Mutex<HashMap<String, Vec<Value>>>>,
}

impl AdvisoryState {
    async fn answer(&self, path: &str, body: Value, reply: &Reply) -> Response {
        log::info!("🧠 [STUB] advisory {path}");
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.to_string())
            .or_default()
            .push(body);
        if !self.fixture.delay.is_zero() {
            tokio::time::sleep(self.fixture.delay).await;
        }
        let status = axum::http::StatusCode::from_u16(reply.status)
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        axum::response::IntoResponse::into_response((status, Json(reply.body.clone())))
    }
}

pub struct AdvisoryStub {
    addr: SocketAddr,
    state: AdvisoryState,
    handle: JoinHandle<()>,
}

impl AdvisoryStub {
    pub async fn start(fixture: AdvisoryFixture) -> Result<Self> {
        env_logger::try_init().ok();

        let state = AdvisoryState {
            fixture: Arc::new(fixture),
            requests: Arc::new(Mutex::new(HashMap::new())),
        };
        let app = Router::new()
            .route(DIAGNOSTIC_PATH, post(diagnostic))
            .route(ADVICE_PATH, post(advice))
            .route(PREDICTIVE_PATH, post(predictive))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [STUB] advisory server stopped: {e}");
            }
        });
        Ok(Self { addr, state, handle })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Dernier corps reçu sur une route
    pub fn last_request(&self, path: &str) -> Option<Value> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .and_then(|bodies| bodies.last().cloned())
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .map_or(0, Vec::len)
    }
}

impl Drop for AdvisoryStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn diagnostic(State(state): State<AdvisoryState>, Json(body): Json<Value>) -> Response {
    let reply = state.fixture.diagnostic.clone();
    state.answer(DIAGNOSTIC_PATH, body, &reply).await
}

async fn advice(State(state): State<AdvisoryState>, Json(body): Json<Value>) -> Response {
    let reply = state.fixture.advice.clone();
    state.answer(ADVICE_PATH, body, &reply).await
}

async fn predictive(State(state): State<AdvisoryState>, Json(body): Json<Value>) -> Response {
    let reply = state.fixture.predictive.clone();
    state.answer(PREDICTIVE_PATH, body, &reply).await
}
