/**
 * LIEN LIVE - Flux SSE ou polling vers le backend
 *
 * RÔLE :
 * Une seule tâche tokio possédée par un `LiveLink`. Ouvrir un nouveau lien
 * ferme l'ancien ; le Drop du handle ferme la tâche (pas de fuite au démontage).
 *
 * FONCTIONNEMENT :
 * - mode stream : GET /api/voltage/stream, décodage SSE, un message = une mise à jour
 * - mode poll : GET /api/voltage toutes les N secondes
 * - toute erreur de transport termine la tâche (pas de reconnexion automatique)
 * - chaque signal porte la génération du lien : le consommateur ignore les
 *   signaux d'un lien déjà remplacé
 */

use crate::backend::BackendClient;
use crate::config::LiveMode;
use crate::connection::ConnectionEvent;
use crate::models::{IncomingReading, StreamPayload};
use crate::sse::SseDecoder;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consommateur des signaux du lien (le dashboard)
pub trait LiveSink: Send + Sync + 'static {
    fn on_event(&self, generation: u64, event: ConnectionEvent);

    /// `None` : payload de polling inexploitable
    fn on_readings(&self, generation: u64, readings: Option<Vec<IncomingReading>>);
}

pub struct LiveLink {
    generation: u64,
    handle: JoinHandle<()>,
}

impl LiveLink {
    pub fn open(
        client: BackendClient,
        mode: LiveMode,
        poll_every: Duration,
        generation: u64,
        sink: Arc<dyn LiveSink>,
    ) -> Self {
        info!("[live] opening link #{generation} ({mode:?}) to {}", client.base_url());
        let handle = match mode {
            LiveMode::Stream => tokio::spawn(run_stream(client, generation, sink)),
            LiveMode::Poll => tokio::spawn(run_poll(client, poll_every, generation, sink)),
        };
        Self { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn close(self) {
        // Drop fait le travail
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("[live] closing link #{}", self.generation);
        }
        self.handle.abort();
    }
}

async fn run_stream(client: BackendClient, generation: u64, sink: Arc<dyn LiveSink>) {
    let response = match client.open_stream().await {
        Ok(response) => response,
        Err(e) => {
            sink.on_event(generation, ConnectionEvent::TransportError { reason: e.to_string() });
            return;
        }
    };
    sink.on_event(generation, ConnectionEvent::StreamOpened);

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for data in decoder.push(&bytes) {
                    dispatch_message(&data, generation, sink.as_ref());
                }
            }
            Err(e) => {
                sink.on_event(generation, ConnectionEvent::TransportError { reason: e.to_string() });
                return;
            }
        }
    }
    sink.on_event(
        generation,
        ConnectionEvent::TransportError { reason: "stream closed by backend".into() },
    );
}

fn dispatch_message(data: &str, generation: u64, sink: &dyn LiveSink) {
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Success { readings: Some(values) }) => {
            sink.on_readings(generation, Some(IncomingReading::from_values(&values)));
            sink.on_event(generation, ConnectionEvent::StreamMessage);
        }
        Ok(StreamPayload::Success { readings: None }) => {
            debug!("[live] success frame without readings, ignored");
        }
        Ok(StreamPayload::Error { message, error_code }) => {
            warn!("[live] backend stream error {:?}", error_code);
            sink.on_event(
                generation,
                ConnectionEvent::StreamErrorPayload {
                    message: message.unwrap_or_else(|| "Unknown stream error".into()),
                },
            );
        }
        // message illisible : ignoré, le flux continue
        Err(e) => debug!("[live] unparsable frame ({e}): {data}"),
    }
}

async fn run_poll(client: BackendClient, every: Duration, generation: u64, sink: Arc<dyn LiveSink>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match client.fetch_voltage().await {
            Ok(readings) => {
                sink.on_readings(generation, readings);
                sink.on_event(generation, ConnectionEvent::PollSucceeded);
            }
            Err(e) => {
                sink.on_event(generation, ConnectionEvent::TransportError { reason: e.to_string() });
                return;
            }
        }
    }
}
