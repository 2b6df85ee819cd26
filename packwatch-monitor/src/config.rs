use crate::models::{DEFAULT_CELL_COUNT, MAX_CELL_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Source des mises à jour live
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LiveMode {
    #[default]
    Stream,
    Poll,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub backend_url: Option<String>,  // ex: "http://raspberrypi.local:5000"
    pub advisory_url: Option<String>, // service advisory (diagnostic, conseils, alertes)
    pub cell_count: usize,
    pub listen: String,
    pub live_mode: LiveMode,
    pub data_dir: String,             // settings.json y est stocké
    pub notification_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            advisory_url: None,
            cell_count: DEFAULT_CELL_COUNT,
            listen: "0.0.0.0:8090".into(),
            live_mode: LiveMode::Stream,
            data_dir: "./data".into(),
            notification_capacity: 50,
        }
    }
}

impl MonitorConfig {
    /// URL backend exploitable (non vide, sans slash final)
    pub fn backend_base(&self) -> Option<String> {
        normalize_url(self.backend_url.as_deref())
    }

    pub fn advisory_base(&self) -> Option<String> {
        normalize_url(self.advisory_url.as_deref())
    }

    fn sanitize(mut self) -> Self {
        if self.cell_count == 0 {
            warn!("cell_count = 0 invalide, usage de {}", DEFAULT_CELL_COUNT);
            self.cell_count = DEFAULT_CELL_COUNT;
        }
        if self.cell_count > MAX_CELL_COUNT {
            warn!("cell_count = {} trop grand, borné à {}", self.cell_count, MAX_CELL_COUNT);
            self.cell_count = MAX_CELL_COUNT;
        }
        if self.notification_capacity == 0 {
            self.notification_capacity = MonitorConfig::default().notification_capacity;
        }
        self
    }

    /// Les variables d'environnement priment sur le fichier
    fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("PACKWATCH_BACKEND_URL") {
            self.backend_url = Some(url);
        }
        if let Ok(url) = std::env::var("PACKWATCH_ADVISORY_URL") {
            self.advisory_url = Some(url);
        }
        self
    }
}

fn normalize_url(raw: Option<&str>) -> Option<String> {
    let url = raw?.trim().trim_end_matches('/');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

pub fn parse_config(txt: &str) -> MonitorConfig {
    if txt.trim().is_empty() {
        return MonitorConfig::default();
    }
    serde_yaml::from_str::<MonitorConfig>(txt)
        .unwrap_or_else(|e| {
            warn!("config invalide: {e}");
            MonitorConfig::default()
        })
        .sanitize()
}

pub async fn load_config_from(path: &Path) -> MonitorConfig {
    if path.exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        warn!("pas de {}, usage config par défaut", path.display());
        MonitorConfig::default()
    }
}

pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("PACKWATCH_CONFIG").unwrap_or_else(|_| "packwatch.yaml".into());
    load_config_from(Path::new(&path)).await.apply_env()
}
