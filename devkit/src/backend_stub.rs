/*!
Stub du backend batterie pour développement sans matériel

Serveur Axum sur un port éphémère qui rejoue un `BackendFixture` :
`/api/voltage`, `/api/voltage/stream` (SSE), `/api/history`, `/api/dashboard`,
`/api/connect`, `/api/download`. Compte les appels par route.
*/

use crate::fixtures::{self, HEALTHY_READINGS, NO_HW_MESSAGE};
use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Réponse figée : code HTTP + corps JSON
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct BackendFixture {
    pub voltage: Reply,
    pub history: Reply,
    pub dashboard: Reply,
    pub connect: Reply,
    pub stream_frames: Vec<Value>,
    pub stream_period: Duration,
    /// Rejoue les frames en boucle ; sinon une seule passe puis fin du flux
    pub stream_repeat: bool,
    pub csv: String,
}

impl BackendFixture {
    /// Pack de 4 cellules saines, flux qui répète la même lecture
    pub fn healthy() -> Self {
        Self {
            voltage: Reply::ok(fixtures::voltage_success(&HEALTHY_READINGS)),
            history: Reply::ok(fixtures::healthy_history(3)),
            dashboard: Reply::ok(fixtures::dashboard_json(
                120,
                &[(1, Some(3.912)), (2, Some(3.861)), (3, Some(3.8)), (4, Some(3.998))],
            )),
            connect: Reply::ok(serde_json::json!({
                "status": "success",
                "message": "Connected to Battery Monitor. ADC Reading for AIN0: 3.9V",
            })),
            stream_frames: vec![fixtures::success_frame(&HEALTHY_READINGS)],
            stream_period: Duration::from_millis(50),
            stream_repeat: true,
            csv: fixtures::history_csv(&HEALTHY_READINGS),
        }
    }

    /// Backend joignable mais sans interface I2C
    pub fn no_hardware() -> Self {
        Self {
            voltage: Reply::with_status(500, fixtures::error_body(NO_HW_MESSAGE, "BSE_NO_HW_INTERFACE")),
            history: Reply::ok(Value::Array(Vec::new())),
            dashboard: Reply::ok(fixtures::error_body("No readings recorded yet.", "BSEDB003")),
            connect: Reply::with_status(
                500,
                fixtures::error_body(NO_HW_MESSAGE, "BSE_NO_HW_INTERFACE_CONNECT"),
            ),
            stream_frames: vec![fixtures::error_frame(NO_HW_MESSAGE, "BSE_STREAM_NO_HW_INTERFACE")],
            stream_period: Duration::from_millis(50),
            stream_repeat: true,
            csv: String::from("timestamp,cell,voltage\n"),
        }
    }

    pub fn with_stream(mut self, frames: Vec<Value>) -> Self {
        self.stream_frames = frames;
        self
    }

    /// Le flux se termine après la dernière frame
    pub fn closing_stream(mut self) -> Self {
        self.stream_repeat = false;
        self
    }

    pub fn with_voltage(mut self, reply: Reply) -> Self {
        self.voltage = reply;
        self
    }

    pub fn with_history(mut self, history: Value) -> Self {
        self.history = Reply::ok(history);
        self
    }
}

#[derive(Clone)]
struct StubState {
    fixture: Arc<Mutex<BackendFixture>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl StubState {
    fn hit(&self, path: &str) -> BackendFixture {
        *self
            .hits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.to_string())
            .or_insert(0) += 1;
        log::debug!("📥 [STUB] {path}");
        self.fixture.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct BackendStub {
    addr: SocketAddr,
    state: StubState,
    handle: JoinHandle<()>,
}

impl BackendStub {
    pub async fn start(fixture: BackendFixture) -> Result<Self> {
        env_logger::try_init().ok();

        let state = StubState {
            fixture: Arc::new(Mutex::new(fixture)),
            hits: Arc::new(Mutex::new(HashMap::new())),
        };
        let app = Router::new()
            .route("/api/voltage", get(voltage))
            .route("/api/voltage/stream", get(voltage_stream))
            .route("/api/history", get(history))
            .route("/api/dashboard", get(dashboard))
            .route("/api/connect", post(connect))
            .route("/api/download", get(download))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [STUB] backend server stopped: {e}");
            }
        });
        log::info!("🔋 [STUB] battery backend on http://{addr}");
        Ok(Self { addr, state, handle })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Nombre d'appels reçus sur une route
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Remplace le comportement pour les requêtes suivantes
    pub fn set_fixture(&self, fixture: BackendFixture) {
        *self.state.fixture.lock().unwrap_or_else(|e| e.into_inner()) = fixture;
    }
}

impl Drop for BackendStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn voltage(State(state): State<StubState>) -> Response {
    state.hit("/api/voltage").voltage.into_response()
}

async fn history(State(state): State<StubState>) -> Response {
    state.hit("/api/history").history.into_response()
}

async fn dashboard(State(state): State<StubState>) -> Response {
    state.hit("/api/dashboard").dashboard.into_response()
}

async fn connect(State(state): State<StubState>) -> Response {
    state.hit("/api/connect").connect.into_response()
}

async fn download(State(state): State<StubState>) -> Response {
    let csv = state.hit("/api/download").csv;
    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=battery_history.csv"),
        ],
        csv,
    )
        .into_response()
}

async fn voltage_stream(State(state): State<StubState>) -> Response {
    let fixture = state.hit("/api/voltage/stream");
    let period = fixture.stream_period;
    let repeat = fixture.stream_repeat && !fixture.stream_frames.is_empty();

    let frames: Box<dyn Iterator<Item = Value> + Send> = if repeat {
        Box::new(fixture.stream_frames.into_iter().cycle())
    } else {
        Box::new(fixture.stream_frames.into_iter())
    };
    let events = stream::iter(frames).then(move |frame| async move {
        tokio::time::sleep(period).await;
        Ok::<Event, Infallible>(Event::default().data(frame.to_string()))
    });

    let body: BoxStream<'static, Result<Event, Infallible>> = if fixture.stream_repeat {
        events.chain(stream::pending()).boxed()
    } else {
        events.boxed()
    };
    Sse::new(body).keep_alive(KeepAlive::default()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_and_hit_counter() {
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let client = reqwest::Client::new();

        let body: Value = client
            .get(format!("{}/api/voltage", stub.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["readings"].as_array().map(Vec::len), Some(4));
        assert_eq!(stub.hits("/api/voltage"), 1);
        assert_eq!(stub.hits("/api/history"), 0);
    }

    #[tokio::test]
    async fn test_no_hardware_statuses() {
        let stub = BackendStub::start(BackendFixture::no_hardware()).await.unwrap();
        let client = reqwest::Client::new();

        let response = client.post(format!("{}/api/connect", stub.base_url())).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error_code"], "BSE_NO_HW_INTERFACE_CONNECT");
    }

    #[tokio::test]
    async fn test_fixture_swap() {
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        stub.set_fixture(BackendFixture::no_hardware());
        let response = reqwest::get(format!("{}/api/voltage", stub.base_url())).await.unwrap();
        assert_eq!(response.status().as_u16(), 500);
    }
}
