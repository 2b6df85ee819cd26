/*!
Builders de payloads backend

Formes JSON renvoyées par le serveur d'acquisition : lectures de cellules,
frames SSE, historique, stats dashboard. Utilisés par les stubs et directement
dans les tests.
*/

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};

/// Lectures par défaut d'un pack sain de 4 cellules
pub const HEALTHY_READINGS: [(u32, Option<f64>); 4] = [(1, Some(3.9)), (2, Some(3.85)), (3, Some(3.8)), (4, Some(4.0))];

pub const NO_HW_MESSAGE: &str = "smbus (I2C interface) is not available on this system";

pub fn readings_json(readings: &[(u32, Option<f64>)]) -> Value {
    Value::Array(
        readings
            .iter()
            .map(|(cell, voltage)| {
                json!({
                    "cell": cell,
                    "ain_channel": format!("AIN{}", cell.saturating_sub(1)),
                    "voltage": voltage,
                })
            })
            .collect(),
    )
}

/// Corps de `GET /api/voltage` en succès
pub fn voltage_success(readings: &[(u32, Option<f64>)]) -> Value {
    json!({
        "status": "success",
        "readings": readings_json(readings),
        "timestamp": Utc::now().to_rfc3339(),
    })
}

pub fn error_body(message: &str, error_code: &str) -> Value {
    json!({ "status": "error", "message": message, "error_code": error_code })
}

/// Frame SSE `{status: success, readings}`
pub fn success_frame(readings: &[(u32, Option<f64>)]) -> Value {
    json!({ "status": "success", "readings": readings_json(readings) })
}

/// Frame SSE `{status: error, message, error_code}`
pub fn error_frame(message: &str, error_code: &str) -> Value {
    error_body(message, error_code)
}

/// Historique chronologique, une seconde entre chaque entrée
pub fn history_json(entries: &[(u32, Option<f64>)]) -> Value {
    let start = Utc
        .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Value::Array(
        entries
            .iter()
            .enumerate()
            .map(|(i, (cell, voltage))| {
                let at = start + ChronoDuration::seconds(i as i64);
                json!({
                    "cell": cell,
                    "voltage": voltage,
                    "timestamp": at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                })
            })
            .collect(),
    )
}

/// `rounds` relevés complets du pack sain
pub fn healthy_history(rounds: usize) -> Value {
    let entries: Vec<(u32, Option<f64>)> = (0..rounds)
        .flat_map(|round| {
            HEALTHY_READINGS
                .iter()
                .map(move |(cell, v)| (*cell, v.map(|v| v - 0.01 * round as f64)))
        })
        .collect();
    history_json(&entries)
}

pub fn dashboard_json(total_readings: u64, averages: &[(u32, Option<f64>)]) -> Value {
    json!({
        "status": "success",
        "total_readings": total_readings,
        "latest_reading_timestamp": "2024-05-01T10:00:11",
        "average_voltages_per_cell": averages
            .iter()
            .map(|(cell, avg)| json!({ "cell": cell, "avg_voltage": avg }))
            .collect::<Vec<_>>(),
    })
}

pub fn history_csv(entries: &[(u32, Option<f64>)]) -> String {
    let mut csv = String::from("timestamp,cell,voltage\n");
    if let Value::Array(rows) = history_json(entries) {
        for row in rows {
            let voltage = row["voltage"].as_f64().map(|v| format!("{v:.3}")).unwrap_or_default();
            csv.push_str(&format!(
                "{},{},{}\n",
                row["timestamp"].as_str().unwrap_or_default(),
                row["cell"],
                voltage
            ));
        }
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_synthesize_channel() {
        let readings = readings_json(&[(1, Some(3.9)), (3, None)]);
        assert_eq!(readings[0]["ain_channel"], "AIN0");
        assert_eq!(readings[1]["ain_channel"], "AIN2");
        assert!(readings[1]["voltage"].is_null());
    }

    #[test]
    fn test_history_is_chronological() {
        let history = history_json(&[(1, Some(3.9)), (2, Some(3.8))]);
        assert_eq!(history[0]["timestamp"], "2024-05-01T10:00:00");
        assert_eq!(history[1]["timestamp"], "2024-05-01T10:00:01");
        assert_eq!(healthy_history(3).as_array().map(Vec::len), Some(12));
    }

    #[test]
    fn test_csv_header() {
        let csv = history_csv(&[(1, Some(3.9))]);
        assert_eq!(csv, "timestamp,cell,voltage\n2024-05-01T10:00:00,1,3.900\n");
    }
}
