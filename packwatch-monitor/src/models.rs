/**
 * MODÈLES - Types de données échangés avec le backend batterie
 *
 * RÔLE :
 * Types canoniques (cellules, historique, stats dashboard) et formes "fil"
 * tolérantes des payloads backend. Un payload malformé n'est jamais fatal :
 * chaque champ illisible retombe sur sa valeur par défaut.
 */

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Nombre de cellules du pack par défaut (configurable)
pub const DEFAULT_CELL_COUNT: usize = 4;
/// Borne haute acceptée pour `cell_count` (config)
pub const MAX_CELL_COUNT: usize = 256;

/// Numéros de cellule `1..=cell_count`, saturés à `u32::MAX`
pub fn cell_numbers(cell_count: usize) -> std::ops::RangeInclusive<u32> {
    1..=u32::try_from(cell_count).unwrap_or(u32::MAX)
}

/// Label de canal synthétisé pour une position (cellule 1 -> "AIN0")
pub fn channel_label(cell: u32) -> String {
    format!("AIN{}", cell.saturating_sub(1))
}

/// Lecture canonique d'une cellule, telle que conservée dans l'état live.
///
/// `voltage` est toujours numérique (les lectures absentes sont ramenées à 0.0),
/// `reported` garde la trace d'une vraie valeur envoyée par le backend : une
/// lecture `null` et un vrai 0.0 s'affichent pareil mais ne sont pas confondus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellVoltageReading {
    pub cell: u32,
    pub voltage: f64,
    #[serde(rename = "ain_channel")]
    pub channel: String,
    pub reported: bool,
}

impl CellVoltageReading {
    /// Slot par défaut d'une cellule (0.0V, aucune lecture)
    pub fn placeholder(cell: u32) -> Self {
        Self {
            cell,
            voltage: 0.0,
            channel: channel_label(cell),
            reported: false,
        }
    }
}

/// Lecture telle que reçue du backend (flux ou fetch), avant réconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingReading {
    #[serde(default, deserialize_with = "lenient_cell")]
    pub cell: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub voltage: Option<f64>,
    #[serde(default, rename = "ain_channel", alias = "channel", deserialize_with = "lenient_string")]
    pub channel: Option<String>,
}

impl IncomingReading {
    pub fn new(cell: i64, voltage: Option<f64>) -> Self {
        Self { cell: Some(cell), voltage, channel: None }
    }

    /// Conversion permissive d'un tableau JSON : les éléments non-objets sont ignorés
    pub fn from_values(values: &[Value]) -> Vec<IncomingReading> {
        values
            .iter()
            .filter_map(|v| serde_json::from_value::<IncomingReading>(v.clone()).ok())
            .collect()
    }
}

/// Entrée de l'historique backend (projection en lecture seule)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageHistoryEntry {
    pub cell: u32,
    pub voltage: Option<f64>,
    pub timestamp: String,
}

/// Fenêtre récente d'une cellule pour les alertes prédictives (≤10 points, ancien -> récent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentCellHistory {
    pub cell: u32,
    pub recent_voltages: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageVoltagePerCell {
    pub cell: u32,
    pub avg_voltage: Option<f64>,
}

/// Statistiques agrégées de `/api/dashboard`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_readings: u64,
    pub latest_reading_timestamp: Option<String>,
    pub average_voltages_per_cell: Vec<AverageVoltagePerCell>,
}

/// Réponse de `GET /api/voltage`
#[derive(Debug, Deserialize)]
pub struct VoltageResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub readings: Value,
}

impl VoltageResponse {
    /// Lectures exploitables, ou `None` si le payload n'est pas un succès bien formé
    pub fn into_readings(self) -> Option<Vec<IncomingReading>> {
        match (self.status.as_deref(), self.readings) {
            (Some("success"), Value::Array(items)) => Some(IncomingReading::from_values(&items)),
            _ => None,
        }
    }
}

/// Événement du flux SSE `/api/voltage/stream`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StreamPayload {
    Success {
        #[serde(default)]
        readings: Option<Vec<Value>>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error_code: Option<String>,
    },
}

/// Réponse de `POST /api/connect`
#[derive(Debug, Deserialize)]
pub struct ConnectProbeResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Normalise la réponse `/api/history` : voltage non numérique -> null,
/// timestamp absent -> heure du fetch, entrée sans numéro de cellule ignorée.
pub fn parse_history(payload: &Value, fetched_at: &str) -> Vec<VoltageHistoryEntry> {
    let Value::Array(items) = payload else { return Vec::new(); };
    items
        .iter()
        .filter_map(|item| {
            let cell = item.get("cell").and_then(Value::as_u64)?;
            let cell = u32::try_from(cell).ok()?;
            let voltage = item.get("voltage").and_then(Value::as_f64);
            let timestamp = item
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| fetched_at.to_string());
            Some(VoltageHistoryEntry { cell, voltage, timestamp })
        })
        .collect()
}

/// Normalise la réponse `/api/dashboard` : statut non "success" -> aucune stat,
/// liste de moyennes absente -> liste vide.
pub fn parse_dashboard(payload: &Value) -> Option<DashboardStats> {
    if payload.get("status").and_then(Value::as_str) != Some("success") {
        return None;
    }
    let averages = payload
        .get("average_voltages_per_cell")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|row| {
                    let cell = u32::try_from(row.get("cell").and_then(Value::as_u64)?).ok()?;
                    Some(AverageVoltagePerCell {
                        cell,
                        avg_voltage: row.get("avg_voltage").and_then(Value::as_f64),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(DashboardStats {
        total_readings: payload.get("total_readings").and_then(Value::as_u64).unwrap_or(0),
        latest_reading_timestamp: payload
            .get("latest_reading_timestamp")
            .and_then(Value::as_str)
            .map(str::to_string),
        average_voltages_per_cell: averages,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_f64().filter(|x| x.is_finite()))
}

fn lenient_cell<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_i64())
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_label() {
        assert_eq!(channel_label(1), "AIN0");
        assert_eq!(channel_label(4), "AIN3");
    }

    #[test]
    fn test_cell_numbers_saturate() {
        assert_eq!(cell_numbers(4).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(cell_numbers(usize::MAX).end(), &u32::MAX);
        assert_eq!(cell_numbers(0).count(), 0);
    }

    #[test]
    fn test_incoming_reading_is_lenient() {
        let values = vec![
            json!({"cell": 1, "voltage": 3.9, "ain_channel": "AIN0"}),
            json!({"cell": 2, "voltage": "oops"}),
            json!({"cell": "three", "voltage": 3.5}),
            json!("not an object"),
            json!({"cell": 4, "voltage": null, "channel": "X4"}),
        ];
        let readings = IncomingReading::from_values(&values);
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[0].voltage, Some(3.9));
        assert_eq!(readings[1].voltage, None);
        assert_eq!(readings[2].cell, None);
        assert_eq!(readings[3].channel.as_deref(), Some("X4"));
    }

    #[test]
    fn test_voltage_response_requires_success_and_array() {
        let ok: VoltageResponse = serde_json::from_value(json!({
            "status": "success", "readings": [{"cell": 1, "voltage": 4.0}]
        })).unwrap();
        assert_eq!(ok.into_readings().map(|r| r.len()), Some(1));

        let err: VoltageResponse = serde_json::from_value(json!({
            "status": "error", "message": "no hw"
        })).unwrap();
        assert!(err.into_readings().is_none());

        let bad: VoltageResponse = serde_json::from_value(json!({
            "status": "success", "readings": "nope"
        })).unwrap();
        assert!(bad.into_readings().is_none());
    }

    #[test]
    fn test_stream_payload_variants() {
        let ok: StreamPayload = serde_json::from_str(r#"{"status":"success","readings":[]}"#).unwrap();
        assert_eq!(ok, StreamPayload::Success { readings: Some(vec![]) });

        let err: StreamPayload = serde_json::from_str(
            r#"{"status":"error","message":"smbus missing","error_code":"BSE_STREAM_NO_HW_INTERFACE"}"#,
        ).unwrap();
        assert!(matches!(err, StreamPayload::Error { message: Some(m), .. } if m == "smbus missing"));

        assert!(serde_json::from_str::<StreamPayload>(r#"{"status":"weird"}"#).is_err());
    }

    #[test]
    fn test_parse_history_normalizes_fields() {
        let payload = json!([
            {"cell": 1, "voltage": 3.9, "timestamp": "2024-05-01T10:00:00"},
            {"cell": 2, "voltage": "bad", "timestamp": "2024-05-01T10:00:01"},
            {"cell": 3, "voltage": 3.7},
            {"voltage": 3.7, "timestamp": "2024-05-01T10:00:02"}
        ]);
        let history = parse_history(&payload, "2024-05-01T12:00:00Z");
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].voltage, None);
        assert_eq!(history[2].timestamp, "2024-05-01T12:00:00Z");

        assert!(parse_history(&json!({"status": "error"}), "now").is_empty());
    }

    #[test]
    fn test_parse_dashboard() {
        let stats = parse_dashboard(&json!({
            "status": "success",
            "total_readings": 120,
            "latest_reading_timestamp": "2024-05-01T10:00:00",
            "average_voltages_per_cell": [{"cell": 1, "avg_voltage": 3.912}, {"cell": 2, "avg_voltage": null}]
        })).unwrap();
        assert_eq!(stats.total_readings, 120);
        assert_eq!(stats.average_voltages_per_cell[1].avg_voltage, None);

        let no_averages = parse_dashboard(&json!({"status": "success", "total_readings": 0})).unwrap();
        assert!(no_averages.average_voltages_per_cell.is_empty());

        assert!(parse_dashboard(&json!({"status": "error", "message": "db down"})).is_none());
    }
}
