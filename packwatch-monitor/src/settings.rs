/**
 * SETTINGS LOCAUX - Seuils de tension et intervalle de mise à jour live
 *
 * RÔLE :
 * Équivalent du stockage local du navigateur : un fichier JSON sous data_dir
 * avec deux clés fixes. Lu au montage, écrit uniquement sur sauvegarde explicite.
 *
 * FONCTIONNEMENT :
 * - Clé absente ou malformée -> valeur par défaut, réécrite dans le fichier
 * - Sauvegarde validée AVANT écriture (intervalle > 0, seuils strictement croissants)
 * - Les autres clés éventuelles du fichier sont conservées
 */

use crate::thresholds::VoltageThresholds;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

pub const THRESHOLDS_KEY: &str = "voltage_thresholds";
pub const INTERVAL_KEY: &str = "live_update_interval_secs";
pub const DEFAULT_INTERVAL_SECS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Thresholds must be in ascending order: critical low < warning low < normal max < warning high")]
    InvalidThresholds,
    #[error("Live update interval must be a positive number of seconds")]
    InvalidInterval,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub thresholds: VoltageThresholds,
    pub live_update_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thresholds: VoltageThresholds::default(),
            live_update_interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.live_update_interval_secs == 0 {
            return Err(SettingsError::InvalidInterval);
        }
        if !self.thresholds.is_ordered() {
            return Err(SettingsError::InvalidThresholds);
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self { path: data_dir.as_ref().join("settings.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lecture au montage ; ne échoue jamais, répare le fichier si besoin
    pub async fn load(&self) -> Settings {
        let mut map = self.read_map().await;
        let mut repaired = false;

        let thresholds = match map.get(THRESHOLDS_KEY).cloned().map(serde_json::from_value::<VoltageThresholds>) {
            Some(Ok(t)) if t.is_ordered() => t,
            other => {
                if other.is_some() {
                    warn!("[settings] seuils stockés invalides, retour aux valeurs par défaut");
                }
                repaired = true;
                VoltageThresholds::default()
            }
        };

        let interval = match map.get(INTERVAL_KEY).and_then(Value::as_u64) {
            Some(secs) if secs > 0 => secs,
            _ => {
                repaired = true;
                DEFAULT_INTERVAL_SECS
            }
        };

        let settings = Settings { thresholds, live_update_interval_secs: interval };
        if repaired {
            Self::merge_into(&mut map, &settings);
            if let Err(e) = self.write_map(&map).await {
                warn!("[settings] impossible d'écrire les valeurs par défaut: {e}");
            }
        }
        settings
    }

    /// Sauvegarde explicite : refusée avant toute écriture si invalide
    pub async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        let mut map = self.read_map().await;
        Self::merge_into(&mut map, settings);
        self.write_map(&map).await?;
        info!(
            "[settings] saved (interval {}s, thresholds {:?})",
            settings.live_update_interval_secs, settings.thresholds
        );
        Ok(())
    }

    fn merge_into(map: &mut Map<String, Value>, settings: &Settings) {
        map.insert(
            THRESHOLDS_KEY.into(),
            serde_json::to_value(settings.thresholds).unwrap_or(Value::Null),
        );
        map.insert(INTERVAL_KEY.into(), Value::from(settings.live_update_interval_secs));
    }

    async fn read_map(&self) -> Map<String, Value> {
        let Ok(txt) = fs::read_to_string(&self.path).await else { return Map::new(); };
        match serde_json::from_str::<Value>(&txt) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!("[settings] {:?} malformé, ignoré", self.path);
                Map::new()
            }
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
