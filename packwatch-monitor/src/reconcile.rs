/**
 * RÉCONCILIATION LIVE - État canonique des tensions par cellule
 *
 * RÔLE :
 * Fusionne les mises à jour partielles (flux SSE, polling, fetch complet) dans
 * un tableau canonique de N cellules, sans jamais muter l'ancien tableau.
 *
 * FONCTIONNEMENT :
 * - Chaque mise à jour part d'un tableau neuf de N slots par défaut (0.0V)
 * - Les lectures hors [1, N] sont ignorées, les tensions illisibles valent 0.0
 * - Tableau identique au précédent -> on rend la MÊME référence (Arc), pas de
 *   marque de fraîcheur, pas de réveil des observateurs
 * - Dernière écriture gagnante entre fetch et flux (pas de numéro de séquence)
 */

use crate::models::{cell_numbers, channel_label, CellVoltageReading, IncomingReading};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

/// Tableau canonique partagé ; remplacé en bloc, jamais modifié en place
pub type CellArray = Arc<Vec<CellVoltageReading>>;

/// N slots par défaut (0.0V, canal synthétisé)
pub fn default_cells(cell_count: usize) -> Vec<CellVoltageReading> {
    cell_numbers(cell_count).map(CellVoltageReading::placeholder).collect()
}

/// Construit le tableau canonique à partir d'une mise à jour partielle.
/// Retourne la référence précédente si le résultat est structurellement identique.
pub fn reconcile(previous: &CellArray, incoming: &[IncomingReading], cell_count: usize) -> CellArray {
    let mut next = default_cells(cell_count);

    for reading in incoming {
        let Some(cell) = reading.cell else { continue };
        let Ok(cell) = u32::try_from(cell) else { continue };
        if cell < 1 || cell as usize > cell_count {
            continue;
        }
        next[(cell - 1) as usize] = CellVoltageReading {
            cell,
            voltage: reading.voltage.unwrap_or(0.0),
            channel: reading.channel.clone().unwrap_or_else(|| channel_label(cell)),
            reported: reading.voltage.is_some(),
        };
    }

    if next.as_slice() == previous.as_slice() {
        Arc::clone(previous)
    } else {
        Arc::new(next)
    }
}

/// Propriétaire de l'état canonique : fraîcheur, révision et diffusion aux observateurs
pub struct Reconciler {
    cell_count: usize,
    current: CellArray,
    last_updated: Option<OffsetDateTime>,
    revision: u64,
    suppressed: u64,
    publisher: watch::Sender<CellArray>,
}

impl Reconciler {
    pub fn new(cell_count: usize) -> Self {
        let current: CellArray = Arc::new(default_cells(cell_count));
        let (publisher, _) = watch::channel(Arc::clone(&current));
        Self {
            cell_count,
            current,
            last_updated: None,
            revision: 0,
            suppressed: 0,
            publisher,
        }
    }

    pub fn current(&self) -> CellArray {
        Arc::clone(&self.current)
    }

    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.last_updated
    }

    /// Incrémentée à chaque mise à jour effective
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Nombre de mises à jour absorbées car identiques
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Observateurs réveillés uniquement sur changement réel
    pub fn subscribe(&self) -> watch::Receiver<CellArray> {
        self.publisher.subscribe()
    }

    /// Applique une mise à jour. `None` (payload manquant ou malformé) ramène
    /// toutes les cellules à leur valeur par défaut. Retourne `true` si l'état a changé.
    pub fn apply(&mut self, incoming: Option<&[IncomingReading]>) -> bool {
        let next = reconcile(&self.current, incoming.unwrap_or(&[]), self.cell_count);
        if Arc::ptr_eq(&next, &self.current) {
            self.suppressed += 1;
            return false;
        }
        self.current = Arc::clone(&next);
        self.last_updated = Some(OffsetDateTime::now_utc());
        self.revision += 1;
        self.publisher.send_replace(next);
        true
    }

    /// Retour à l'état de montage (N x 0.0V, aucune fraîcheur)
    pub fn reset(&mut self) {
        self.current = Arc::new(default_cells(self.cell_count));
        self.last_updated = None;
        self.publisher.send_replace(Arc::clone(&self.current));
    }
}
