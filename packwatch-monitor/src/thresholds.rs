//! Voltage thresholds, status classification and battery level mapping.
//!
//! Band boundaries are lower-inclusive: each cutoff belongs to the band above
//! it, so the five bands partition the real line without gaps or overlaps.
//!
//! | band          | range                             |
//! |---------------|-----------------------------------|
//! | CriticalLow   | `v < critical_low`                |
//! | WarningLow    | `critical_low <= v < warning_low` |
//! | Normal        | `warning_low <= v < normal_max`   |
//! | WarningHigh   | `normal_max <= v < warning_high`  |
//! | CriticalHigh  | `v >= warning_high`               |

use serde::{Deserialize, Serialize};

/// Tension d'une cellule vide (0%)
pub const EMPTY_VOLTAGE: f64 = 3.0;
/// Tension d'une cellule pleine (100%)
pub const FULL_VOLTAGE: f64 = 4.2;

/// User-configurable cutoffs. Valid only when strictly ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageThresholds {
    pub critical_low: f64,
    pub warning_low: f64,
    pub normal_max: f64,
    pub warning_high: f64,
}

impl Default for VoltageThresholds {
    fn default() -> Self {
        Self {
            critical_low: 3.2,
            warning_low: 3.7,
            normal_max: 4.2,
            warning_high: 4.25,
        }
    }
}

impl VoltageThresholds {
    /// `critical_low < warning_low < normal_max < warning_high`, all finite
    pub fn is_ordered(&self) -> bool {
        let all = [self.critical_low, self.warning_low, self.normal_max, self.warning_high];
        all.iter().all(|v| v.is_finite())
            && self.critical_low < self.warning_low
            && self.warning_low < self.normal_max
            && self.normal_max < self.warning_high
    }
}

/// Health band of a single cell reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellStatus {
    CriticalLow,
    WarningLow,
    Normal,
    WarningHigh,
    CriticalHigh,
}

impl CellStatus {
    pub const ALL: [CellStatus; 5] = [
        CellStatus::CriticalLow,
        CellStatus::WarningLow,
        CellStatus::Normal,
        CellStatus::WarningHigh,
        CellStatus::CriticalHigh,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CellStatus::CriticalLow => "Critical Low",
            CellStatus::WarningLow => "Warning Low",
            CellStatus::Normal => "Normal",
            CellStatus::WarningHigh => "Warning High",
            CellStatus::CriticalHigh => "Critical High",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CellStatus::CriticalLow => "Voltage is critically low!",
            CellStatus::WarningLow => "Voltage is below the recommended range.",
            CellStatus::Normal => "Voltage is within the normal range.",
            CellStatus::WarningHigh => "Voltage is above the recommended range.",
            CellStatus::CriticalHigh => "Voltage is critically high!",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, CellStatus::CriticalLow | CellStatus::CriticalHigh)
    }
}

/// Classe une tension dans l'une des cinq bandes. Totale : NaN est traité comme
/// une absence de lecture (CriticalLow), les infinis tombent dans la bande extrême.
pub fn classify(voltage: f64, thresholds: &VoltageThresholds) -> CellStatus {
    if voltage.is_nan() || voltage < thresholds.critical_low {
        CellStatus::CriticalLow
    } else if voltage < thresholds.warning_low {
        CellStatus::WarningLow
    } else if voltage < thresholds.normal_max {
        CellStatus::Normal
    } else if voltage < thresholds.warning_high {
        CellStatus::WarningHigh
    } else {
        CellStatus::CriticalHigh
    }
}

/// Niveau de charge affiché (0..=100), linéaire entre 3.0V et 4.2V, borné.
pub fn level_percent(voltage: f64) -> f64 {
    if voltage.is_nan() {
        return 0.0;
    }
    let ratio = (voltage - EMPTY_VOLTAGE) / (FULL_VOLTAGE - EMPTY_VOLTAGE);
    (ratio * 100.0).clamp(0.0, 100.0)
}

/// Description affichée d'une carte cellule ; une cellule sans lecture reste
/// "critically low" pour le classement mais est décrite comme non connectée.
pub fn describe(status: CellStatus, reported: bool) -> &'static str {
    if !reported {
        return "No reading or unconnected.";
    }
    status.description()
}
