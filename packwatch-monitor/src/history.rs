//! History aggregation: bounded per-cell windows and per-cell statistics.
//!
//! Everything here works on a snapshot of the history log and never mutates it.

use crate::models::{cell_numbers, RecentCellHistory, VoltageHistoryEntry};
use serde::Serialize;

/// Taille max de la fenêtre récente par cellule
pub const RECENT_WINDOW: usize = 10;
/// Points minimum pour qu'une tendance ait un sens
pub const MIN_TREND_POINTS: usize = 2;

/// Last `RECENT_WINDOW` entries of each cell `1..=cell_count`, oldest to newest.
/// Cells with fewer than two entries are left out.
pub fn recent_history_per_cell(history: &[VoltageHistoryEntry], cell_count: usize) -> Vec<RecentCellHistory> {
    cell_numbers(cell_count)
        .filter_map(|cell| {
            let voltages: Vec<Option<f64>> = history
                .iter()
                .filter(|entry| entry.cell == cell)
                .map(|entry| entry.voltage)
                .collect();
            if voltages.len() < MIN_TREND_POINTS {
                return None;
            }
            let start = voltages.len().saturating_sub(RECENT_WINDOW);
            Some(RecentCellHistory { cell, recent_voltages: voltages[start..].to_vec() })
        })
        .collect()
}

/// Garde grossière avant une demande d'alertes prédictives : au moins 2*N entrées
/// au total, sans vérifier la répartition par cellule.
pub fn has_sufficient_history(history: &[VoltageHistoryEntry], cell_count: usize) -> bool {
    history.len() >= cell_count * MIN_TREND_POINTS
}

pub fn cell_history(history: &[VoltageHistoryEntry], cell: u32) -> Vec<VoltageHistoryEntry> {
    history.iter().filter(|entry| entry.cell == cell).cloned().collect()
}

/// Min / max / moyenne d'une cellule sur les entrées non nulles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellHistoryStats {
    pub cell: u32,
    pub entries: usize,
    pub min_voltage: Option<f64>,
    pub max_voltage: Option<f64>,
    pub avg_voltage: Option<f64>,
}

pub fn cell_stats(history: &[VoltageHistoryEntry], cell: u32) -> CellHistoryStats {
    let mut entries = 0;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    let mut sum = 0.0;
    let mut count = 0usize;

    for entry in history.iter().filter(|e| e.cell == cell) {
        entries += 1;
        let Some(v) = entry.voltage else { continue };
        min = Some(min.map_or(v, |m| m.min(v)));
        max = Some(max.map_or(v, |m| m.max(v)));
        sum += v;
        count += 1;
    }

    CellHistoryStats {
        cell,
        entries,
        min_voltage: min,
        max_voltage: max,
        avg_voltage: (count > 0).then(|| sum / count as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cell: u32, voltage: Option<f64>, second: u32) -> VoltageHistoryEntry {
        VoltageHistoryEntry { cell, voltage, timestamp: format!("2024-05-01T10:00:{second:02}") }
    }

    #[test]
    fn test_single_entry_cell_excluded() {
        let history = vec![entry(1, Some(3.9), 0), entry(1, Some(3.8), 1), entry(2, Some(3.7), 2)];
        let recent = recent_history_per_cell(&history, 2);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].cell, 1);
        assert_eq!(recent[0].recent_voltages, vec![Some(3.9), Some(3.8)]);
    }

    #[test]
    fn test_window_keeps_last_ten_in_order() {
        let history: Vec<_> = (0..15).map(|i| entry(1, Some(i as f64), i)).collect();
        let recent = recent_history_per_cell(&history, 1);
        assert_eq!(recent[0].recent_voltages.len(), RECENT_WINDOW);
        assert_eq!(recent[0].recent_voltages.first(), Some(&Some(5.0)));
        assert_eq!(recent[0].recent_voltages.last(), Some(&Some(14.0)));
    }

    #[test]
    fn test_nulls_are_kept_in_window() {
        let history = vec![entry(1, Some(3.9), 0), entry(1, None, 1), entry(1, Some(3.8), 2)];
        let recent = recent_history_per_cell(&history, 1);
        assert_eq!(recent[0].recent_voltages, vec![Some(3.9), None, Some(3.8)]);
    }

    #[test]
    fn test_cells_outside_pack_are_ignored() {
        let history = vec![entry(7, Some(3.9), 0), entry(7, Some(3.8), 1)];
        assert!(recent_history_per_cell(&history, 4).is_empty());
    }

    #[test]
    fn test_coarse_gate_admits_despite_excluded_cell() {
        // 3 entrées pour la cellule 1, 1 pour la cellule 2, N = 2
        let history = vec![
            entry(1, Some(3.9), 0),
            entry(2, Some(3.7), 1),
            entry(1, Some(3.88), 2),
            entry(1, Some(3.86), 3),
        ];
        assert!(has_sufficient_history(&history, 2));
        let recent = recent_history_per_cell(&history, 2);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].cell, 1);
        assert_eq!(recent[0].recent_voltages.len(), 3);
    }

    #[test]
    fn test_gate_rejects_short_log() {
        let history = vec![entry(1, Some(3.9), 0), entry(1, Some(3.8), 1), entry(1, Some(3.7), 2)];
        assert!(!has_sufficient_history(&history, 2));
    }

    #[test]
    fn test_input_log_untouched() {
        let history = vec![entry(1, Some(3.9), 0), entry(1, Some(3.8), 1)];
        let snapshot = history.clone();
        let _ = recent_history_per_cell(&history, 1);
        assert_eq!(history, snapshot);
    }

    #[test]
    fn test_cell_stats_skip_nulls() {
        let history = vec![
            entry(1, Some(3.6), 0),
            entry(1, None, 1),
            entry(1, Some(4.0), 2),
            entry(2, Some(1.0), 3),
        ];
        let stats = cell_stats(&history, 1);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.min_voltage, Some(3.6));
        assert_eq!(stats.max_voltage, Some(4.0));
        assert!((stats.avg_voltage.unwrap() - 3.8).abs() < 1e-9);

        let empty = cell_stats(&history, 3);
        assert_eq!(empty.entries, 0);
        assert_eq!(empty.avg_voltage, None);
        assert_eq!(cell_history(&history, 2).len(), 1);
    }
}
