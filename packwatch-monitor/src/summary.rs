//! Card views and pack-wide summary derived from the canonical cell array.

use crate::models::CellVoltageReading;
use crate::thresholds::{classify, describe, level_percent, CellStatus, VoltageThresholds};
use serde::Serialize;
use std::collections::BTreeMap;

/// Vue d'une carte cellule : tension affichée, bande, niveau de jauge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellCard {
    pub cell: u32,
    pub ain_channel: String,
    pub voltage: f64,
    pub display_voltage: String,
    pub reported: bool,
    pub status: CellStatus,
    pub status_label: &'static str,
    pub description: &'static str,
    pub level_percent: f64,
}

impl CellCard {
    pub fn from_reading(reading: &CellVoltageReading, thresholds: &VoltageThresholds) -> Self {
        let status = classify(reading.voltage, thresholds);
        Self {
            cell: reading.cell,
            ain_channel: reading.channel.clone(),
            voltage: reading.voltage,
            display_voltage: format!("{:.2}V", reading.voltage),
            reported: reading.reported,
            status,
            status_label: status.label(),
            description: describe(status, reading.reported),
            level_percent: level_percent(reading.voltage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackSummary {
    pub pack_voltage: f64,
    pub min_cell_voltage: f64,
    pub max_cell_voltage: f64,
    pub voltage_spread: f64,
    pub reported_cells: usize,
    pub critical_cells: Vec<u32>,
    pub status_counts: BTreeMap<String, usize>,
}

impl PackSummary {
    /// Les cellules sans lecture comptent 0V dans la tension pack mais sont
    /// exclues du min/max ; l'écart n'a de sens qu'à partir de 2 lectures.
    pub fn from_cells(cells: &[CellVoltageReading], thresholds: &VoltageThresholds) -> Self {
        let pack_voltage = cells.iter().map(|c| c.voltage).sum();
        let reported: Vec<f64> = cells.iter().filter(|c| c.reported).map(|c| c.voltage).collect();

        let min = reported.iter().copied().fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));
        let max = reported.iter().copied().fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        let spread = match (min, max) {
            (Some(lo), Some(hi)) if reported.len() > 1 => hi - lo,
            _ => 0.0,
        };

        let critical_cells = cells
            .iter()
            .filter(|c| classify(c.voltage, thresholds).is_critical())
            .map(|c| c.cell)
            .collect();

        let mut status_counts: BTreeMap<String, usize> = CellStatus::ALL
            .iter()
            .map(|s| (status_key(*s), 0))
            .collect();
        for cell in cells {
            *status_counts.entry(status_key(classify(cell.voltage, thresholds))).or_insert(0) += 1;
        }

        Self {
            pack_voltage,
            min_cell_voltage: min.unwrap_or(0.0),
            max_cell_voltage: max.unwrap_or(0.0),
            voltage_spread: spread,
            reported_cells: reported.len(),
            critical_cells,
            status_counts,
        }
    }
}

fn status_key(status: CellStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| status.label().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(cell: u32, voltage: f64, reported: bool) -> CellVoltageReading {
        CellVoltageReading { cell, voltage, channel: format!("AIN{}", cell - 1), reported }
    }

    #[test]
    fn test_card_for_scenario_cells() {
        let t = VoltageThresholds::default();
        let card = CellCard::from_reading(&reading(1, 3.9, true), &t);
        assert_eq!(card.status, CellStatus::Normal);
        assert_eq!(card.display_voltage, "3.90V");
        assert!((card.level_percent - 75.0).abs() < 1e-9);

        let card = CellCard::from_reading(&reading(2, 3.1, true), &t);
        assert_eq!(card.status, CellStatus::CriticalLow);
        assert_eq!(card.description, "Voltage is critically low!");

        let card = CellCard::from_reading(&reading(3, 0.0, false), &t);
        assert_eq!(card.display_voltage, "0.00V");
        assert_eq!(card.description, "No reading or unconnected.");
    }

    #[test]
    fn test_pack_summary() {
        let t = VoltageThresholds::default();
        let cells = vec![
            reading(1, 3.9, true),
            reading(2, 3.1, true),
            reading(3, 0.0, false),
            reading(4, 4.0, true),
        ];
        let summary = PackSummary::from_cells(&cells, &t);
        assert!((summary.pack_voltage - 11.0).abs() < 1e-9);
        assert_eq!(summary.min_cell_voltage, 3.1);
        assert_eq!(summary.max_cell_voltage, 4.0);
        assert!((summary.voltage_spread - 0.9).abs() < 1e-9);
        assert_eq!(summary.reported_cells, 3);
        assert_eq!(summary.critical_cells, vec![2, 3]);
        assert_eq!(summary.status_counts["critical-low"], 2);
        assert_eq!(summary.status_counts["normal"], 2);
        assert_eq!(summary.status_counts["warning-high"], 0);
    }

    #[test]
    fn test_spread_needs_two_readings() {
        let t = VoltageThresholds::default();
        let summary = PackSummary::from_cells(&[reading(1, 3.9, true), reading(2, 0.0, false)], &t);
        assert_eq!(summary.voltage_spread, 0.0);
        assert_eq!(summary.min_cell_voltage, 3.9);
    }
}
