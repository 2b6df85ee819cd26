/**
 * CLIENT BACKEND - Accès HTTP au serveur d'acquisition batterie
 *
 * RÔLE :
 * Enveloppe reqwest autour des endpoints `/api/...` du backend. Les réponses
 * sont normalisées ici (voir models.rs) : le reste du moniteur ne voit jamais
 * de JSON brut.
 *
 * FONCTIONNEMENT :
 * - GET /api/voltage, /api/history, /api/dashboard : snapshot complet
 * - GET /api/voltage/stream : réponse SSE brute, décodée par le lien live
 * - POST /api/connect : sonde matérielle (corps JSON lu même en HTTP 500)
 * - GET /api/download : CSV, jamais parsé, seulement sauvegardé
 */

use crate::models::{
    parse_dashboard, parse_history, ConnectProbeResponse, DashboardStats, IncomingReading,
    VoltageHistoryEntry, VoltageResponse,
};
use reqwest::StatusCode;
use serde_json::Value;
use std::path::Path;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("invalid payload from {url}: {reason}")]
    Payload { url: String, reason: String },
    #[error("{0}")]
    Rejected(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct BackendClient {
    base: String,
    http: reqwest::Client,
}

impl BackendClient {
    /// `base` sans slash final (voir `MonitorConfig::backend_base`)
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            http: reqwest::Client::builder()
                .user_agent(concat!("packwatch-monitor/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn download_url(&self) -> String {
        self.url("/api/download")
    }

    async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BackendError::Transport { url: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(BackendError::Status { url, status: response.status() });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::Payload { url, reason: e.to_string() })
    }

    /// `Ok(None)` : réponse reçue mais pas un succès exploitable
    pub async fn fetch_voltage(&self) -> Result<Option<Vec<IncomingReading>>, BackendError> {
        let payload = self.get_json("/api/voltage").await?;
        let readings = serde_json::from_value::<VoltageResponse>(payload)
            .ok()
            .and_then(VoltageResponse::into_readings);
        debug!("[backend] /api/voltage -> {:?} readings", readings.as_ref().map(Vec::len));
        Ok(readings)
    }

    pub async fn fetch_history(&self) -> Result<Vec<VoltageHistoryEntry>, BackendError> {
        let payload = self.get_json("/api/history").await?;
        let fetched_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        Ok(parse_history(&payload, &fetched_at))
    }

    pub async fn fetch_dashboard(&self) -> Result<Option<DashboardStats>, BackendError> {
        let payload = self.get_json("/api/dashboard").await?;
        Ok(parse_dashboard(&payload))
    }

    /// Ouvre le flux SSE ; le corps est consommé par l'appelant
    pub async fn open_stream(&self) -> Result<reqwest::Response, BackendError> {
        let url = self.url("/api/voltage/stream");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|source| BackendError::Transport { url: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(BackendError::Status { url, status: response.status() });
        }
        Ok(response)
    }

    /// Sonde matérielle ; retourne le message du backend en cas de succès
    pub async fn probe(&self) -> Result<String, BackendError> {
        let url = self.url("/api/connect");
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|source| BackendError::Transport { url: url.clone(), source })?;
        let status = response.status();

        // le backend renvoie un corps JSON explicatif même en 500
        let body = response.json::<ConnectProbeResponse>().await.ok();
        match body {
            Some(ConnectProbeResponse { status: Some(s), message }) if s == "success" && status.is_success() => {
                Ok(message.unwrap_or_else(|| "Connected to Battery Monitor.".into()))
            }
            Some(ConnectProbeResponse { message: Some(message), .. }) => Err(BackendError::Rejected(message)),
            _ if !status.is_success() => Err(BackendError::Status { url, status }),
            _ => Err(BackendError::Payload { url, reason: "missing status".into() }),
        }
    }

    /// Télécharge le CSV d'historique tel quel ; retourne le nombre d'octets écrits
    pub async fn save_csv(&self, dest: &Path) -> Result<u64, BackendError> {
        let url = self.download_url();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BackendError::Transport { url: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(BackendError::Status { url, status: response.status() });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { url: url.clone(), source })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwatch_devkit::{BackendFixture, BackendStub};

    #[tokio::test]
    async fn test_fetch_snapshot_endpoints() {
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let client = BackendClient::new(stub.base_url());

        let readings = client.fetch_voltage().await.unwrap().unwrap();
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[0].voltage, Some(3.9));

        let history = client.fetch_history().await.unwrap();
        assert!(!history.is_empty());

        let stats = client.fetch_dashboard().await.unwrap().unwrap();
        assert_eq!(stats.average_voltages_per_cell.len(), 4);
    }

    #[tokio::test]
    async fn test_voltage_error_payload_is_not_usable() {
        let stub = BackendStub::start(BackendFixture::no_hardware()).await.unwrap();
        let client = BackendClient::new(stub.base_url());
        // HTTP 500 avec corps d'erreur
        assert!(matches!(client.fetch_voltage().await, Err(BackendError::Status { .. })));
        assert!(client.fetch_dashboard().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_reads_error_message() {
        let stub = BackendStub::start(BackendFixture::no_hardware()).await.unwrap();
        let client = BackendClient::new(stub.base_url());
        match client.probe().await {
            Err(BackendError::Rejected(message)) => assert!(message.contains("smbus")),
            other => panic!("unexpected probe result: {other:?}"),
        }

        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let client = BackendClient::new(stub.base_url());
        assert!(client.probe().await.unwrap().contains("AIN0"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let client = BackendClient::new("http://127.0.0.1:9");
        assert!(matches!(client.fetch_history().await, Err(BackendError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_save_csv() {
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let client = BackendClient::new(stub.base_url());
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("exports/history.csv");

        let written = client.save_csv(&dest).await.unwrap();
        let content = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(written as usize, content.len());
        assert!(content.starts_with("timestamp,cell,voltage"));
    }
}
