/**
 * MACHINE D'ÉTAT DE CONNEXION - Cycle de vie du lien live avec le backend
 *
 * RÔLE :
 * Fonction de transition pure (état + événement -> état + notifications).
 * L'émission des notifications est faite ailleurs (NotificationLog), ce qui
 * rend la logique testable seule.
 *
 * RÈGLES :
 * - initial/connecting -> streaming à l'ouverture du flux (une notif)
 * - messages répétés : on reste en streaming, aucune notif
 * - payload d'erreur du backend : avertissement, état inchangé
 * - erreur de transport : -> error, une seule notif par entrée dans error
 * - seule une reconnexion explicite (Connect) fait sortir de error
 */

use crate::notify::Notice;
use serde::{Deserialize, Serialize};

pub const TITLE_LIVE_ACTIVE: &str = "Live Connection Active";
pub const TITLE_POLLING_ACTIVE: &str = "Live Polling Active";
pub const TITLE_LIVE_FAILED: &str = "Live Connection Failed";
pub const TITLE_STREAM_ERROR: &str = "Live Update Stream Error";
pub const TITLE_URL_MISSING: &str = "API URL Not Configured";
pub const TITLE_PROBE_OK: &str = "Connected to Battery Monitor";
pub const TITLE_PROBE_FAILED: &str = "Hardware Check Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Initial,
    Connecting,
    Connected,
    Streaming,
    Polling,
    Error,
}

impl ConnectionStatus {
    /// Un lien live (flux ou polling) délivre des données
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Streaming | ConnectionStatus::Polling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Tentative de (re)connexion explicite
    Connect,
    /// URL backend absente : court-circuit vers error sans tentative
    MissingBackendUrl,
    StreamOpened,
    /// Message de flux avec payload "success"
    StreamMessage,
    /// Message de flux avec payload "error" (non fatal)
    StreamErrorPayload { message: String },
    TransportError { reason: String },
    PollSucceeded,
    ProbeSucceeded { message: String },
    ProbeFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: ConnectionStatus,
    pub effects: Vec<Notice>,
}

impl Transition {
    fn to(status: ConnectionStatus) -> Self {
        Self { status, effects: Vec::new() }
    }

    fn with(mut self, notice: Notice) -> Self {
        self.effects.push(notice);
        self
    }
}

pub fn transition(current: ConnectionStatus, event: &ConnectionEvent) -> Transition {
    use ConnectionStatus::*;

    match event {
        ConnectionEvent::Connect => Transition::to(Connecting),

        ConnectionEvent::MissingBackendUrl => {
            let t = Transition::to(Error);
            if current == Error {
                return t;
            }
            t.with(
                Notice::error(
                    TITLE_URL_MISSING,
                    "Backend API URL is missing. Set backend_url in the configuration or PACKWATCH_BACKEND_URL.",
                )
                .persistent(),
            )
        }

        ConnectionEvent::StreamOpened => {
            let t = Transition::to(Streaming);
            if current == Streaming {
                return t;
            }
            t.with(Notice::info(TITLE_LIVE_ACTIVE, "Receiving real-time voltage updates."))
        }

        ConnectionEvent::StreamMessage => Transition::to(Streaming),

        ConnectionEvent::StreamErrorPayload { message } => Transition::to(current).with(Notice::warning(
            TITLE_STREAM_ERROR,
            format!("Backend stream reported: {message}"),
        )),

        ConnectionEvent::TransportError { reason } => {
            let t = Transition::to(Error);
            if current == Error {
                return t;
            }
            t.with(Notice::error(
                TITLE_LIVE_FAILED,
                format!("Could not connect to live update stream ({reason}). Check backend."),
            ))
        }

        ConnectionEvent::PollSucceeded => {
            let t = Transition::to(Polling);
            if current == Polling {
                return t;
            }
            t.with(Notice::info(TITLE_POLLING_ACTIVE, "Polling the backend for voltage updates."))
        }

        ConnectionEvent::ProbeSucceeded { message } => {
            let status = if current.is_live() { current } else { Connected };
            Transition::to(status).with(Notice::info(TITLE_PROBE_OK, message.clone()))
        }

        ConnectionEvent::ProbeFailed { message } => {
            Transition::to(current).with(Notice::warning(TITLE_PROBE_FAILED, message.clone()))
        }
    }
}
