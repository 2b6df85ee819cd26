/**
 * DASHBOARD - Orchestration de la vue live du pack
 *
 * RÔLE :
 * Possède tout l'état process : tableau canonique (Reconciler), statut de
 * connexion, historique, stats, panneaux advisory, notifications, settings.
 * Les handlers HTTP ne font que lire des vues ou déclencher des actions ici.
 *
 * CYCLE DE VIE :
 * - mount : settings rechargés, statut remis à initial, lien live ouvert,
 *   fetch complet (voltage/history/dashboard en parallèle)
 * - unmount : lien live fermé, signaux tardifs ignorés (génération)
 * - URL backend absente : statut error + notice persistante, vues vides,
 *   aucune tentative réseau
 */

use crate::advisory::{
    AdvisoryError, AdvisoryFeature, AdvisoryGateway, AdvisoryPanels, AdvisoryResult, AdvisoryService,
    DiagnosticReport, Generating, HttpAdvisoryService, PredictiveAlerts,
};
use crate::backend::BackendClient;
use crate::config::{LiveMode, MonitorConfig};
use crate::connection::{transition, ConnectionEvent, ConnectionStatus};
use crate::health::{memory_usage_mb, HealthTracker, MonitorHealth};
use crate::history::{cell_history, cell_stats, has_sufficient_history, recent_history_per_cell, CellHistoryStats};
use crate::live::{LiveLink, LiveSink};
use crate::models::{DashboardStats, IncomingReading, VoltageHistoryEntry};
use crate::notify::{Notice, Notification, NotificationLog};
use crate::reconcile::{CellArray, Reconciler};
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::state::{new_state, snapshot, Shared};
use crate::summary::{CellCard, PackSummary};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const TITLE_REFRESHING: &str = "Refreshing Data";
pub const TITLE_LOAD_FAILED: &str = "Initial Data Load Failed";
pub const TITLE_NOT_ENOUGH_DATA: &str = "Not Enough Data";
pub const TITLE_NOT_ENOUGH_RECENT: &str = "Not Enough Recent Data";

/// Vues dérivées des fetchs, remplacées en bloc
#[derive(Debug, Clone, Default)]
struct ViewState {
    status: ConnectionStatus,
    settings: Settings,
    history: Vec<VoltageHistoryEntry>,
    stats: Option<DashboardStats>,
    stats_updated: Option<OffsetDateTime>,
    panels: AdvisoryPanels,
}

/// Partie de l'état atteinte par le lien live
struct LiveCore {
    reconciler: Shared<Reconciler>,
    view: Shared<ViewState>,
    notifications: Shared<NotificationLog>,
    generation: AtomicU64,
}

impl LiveCore {
    fn apply_event(&self, event: &ConnectionEvent) -> ConnectionStatus {
        let (status, effects) = {
            let mut view = self.view.lock();
            let t = transition(view.status, event);
            if t.status != view.status {
                debug!("[dashboard] connection {:?} -> {:?}", view.status, t.status);
            }
            view.status = t.status;
            (t.status, t.effects)
        };
        self.notifications.lock().emit_all(effects);
        status
    }

    fn apply_readings(&self, readings: Option<&[IncomingReading]>) -> bool {
        self.reconciler.lock().apply(readings)
    }

    fn is_current(&self, generation: u64) -> bool {
        let current = self.generation.load(Ordering::Acquire);
        if generation != current {
            debug!("[dashboard] ignoring signal from stale link #{generation} (current #{current})");
        }
        generation == current
    }
}

impl LiveSink for LiveCore {
    fn on_event(&self, generation: u64, event: ConnectionEvent) {
        if self.is_current(generation) {
            self.apply_event(&event);
        }
    }

    fn on_readings(&self, generation: u64, readings: Option<Vec<IncomingReading>>) {
        if self.is_current(generation) {
            self.apply_readings(readings.as_deref());
        }
    }
}

// --- vues exposées ---

#[derive(Debug, Clone, Serialize)]
pub struct CellsView {
    pub cells: Vec<CellCard>,
    pub last_updated: Option<String>,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellDetail {
    pub card: CellCard,
    pub stats: CellHistoryStats,
    pub history: Vec<VoltageHistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionView {
    pub status: ConnectionStatus,
    pub backend_url: Option<String>,
    pub live_mode: LiveMode,
    pub link_open: bool,
    pub link_generation: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub stats: Option<DashboardStats>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratingView {
    pub diagnostic: bool,
    pub advice: bool,
    pub predictive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryView {
    pub configured: bool,
    pub panels: AdvisoryPanels,
    pub generating: GeneratingView,
}

pub struct Dashboard {
    config: MonitorConfig,
    backend: Option<BackendClient>,
    advisory: AdvisoryGateway,
    settings_store: SettingsStore,
    core: Arc<LiveCore>,
    link: Mutex<Option<LiveLink>>,
    generating: Generating,
    health: HealthTracker,
}

impl Dashboard {
    pub fn new(config: MonitorConfig, advisory: Option<Arc<dyn AdvisoryService>>) -> Self {
        let backend = config.backend_base().map(BackendClient::new);
        let core = Arc::new(LiveCore {
            reconciler: new_state(Reconciler::new(config.cell_count)),
            view: new_state(ViewState::default()),
            notifications: new_state(NotificationLog::new(config.notification_capacity)),
            generation: AtomicU64::new(0),
        });
        Self {
            advisory: AdvisoryGateway::new(advisory, config.cell_count),
            settings_store: SettingsStore::new(&config.data_dir),
            backend,
            core,
            link: Mutex::new(None),
            generating: Generating::default(),
            health: HealthTracker::new(),
            config,
        }
    }

    /// Service advisory HTTP si `advisory_url` est configurée
    pub fn from_config(config: MonitorConfig) -> Self {
        let advisory = config
            .advisory_base()
            .map(|base| Arc::new(HttpAdvisoryService::new(base)) as Arc<dyn AdvisoryService>);
        Self::new(config, advisory)
    }

    // --- cycle de vie ---

    pub async fn mount(&self) {
        let settings = self.settings_store.load().await;
        {
            let mut view = self.core.view.lock();
            *view = ViewState { settings, ..ViewState::default() };
        }
        self.core.reconciler.lock().reset();

        if self.backend.is_none() {
            self.missing_backend_url();
            return;
        }
        self.open_link();
        self.fetch_full().await;
        info!("[dashboard] mounted ({} cells)", self.config.cell_count);
    }

    pub fn unmount(&self) {
        let mut slot = self.link.lock();
        self.core.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(link) = slot.take() {
            link.close();
            info!("[dashboard] live link closed");
        }
    }

    fn missing_backend_url(&self) {
        self.core.apply_event(&ConnectionEvent::MissingBackendUrl);
        self.core.reconciler.lock().reset();
        let mut view = self.core.view.lock();
        view.history.clear();
        view.stats = None;
        view.stats_updated = Some(OffsetDateTime::now_utc());
    }

    /// Remplace le lien live courant ; l'ancien est fermé avant l'ouverture
    fn open_link(&self) {
        let Some(backend) = self.backend.clone() else { return };
        // un seul verrou du bump de génération au stockage : le lien stocké
        // porte toujours la génération courante
        let mut slot = self.link.lock();
        let generation = self.core.generation.fetch_add(1, Ordering::AcqRel) + 1;
        drop(slot.take());

        self.core.apply_event(&ConnectionEvent::Connect);
        let interval = self.core.view.lock().settings.live_update_interval_secs;
        let sink: Arc<dyn LiveSink> = self.core.clone();
        *slot = Some(LiveLink::open(
            backend,
            self.config.live_mode,
            Duration::from_secs(interval.max(1)),
            generation,
            sink,
        ));
        self.health.increment_links();
    }

    fn link_open(&self) -> bool {
        self.link.lock().as_ref().is_some_and(|link| !link.is_finished())
    }

    // --- actions ---

    /// Fetch complet : voltage, history et dashboard en parallèle,
    /// chaque résultat traité indépendamment
    pub async fn fetch_full(&self) {
        let Some(backend) = self.backend.as_ref() else {
            self.missing_backend_url();
            return;
        };
        if !self.link_open() && self.core.view.lock().status != ConnectionStatus::Error {
            self.core.apply_event(&ConnectionEvent::Connect);
        }

        let (voltage, history, stats) =
            tokio::join!(backend.fetch_voltage(), backend.fetch_history(), backend.fetch_dashboard());

        let mut failures = Vec::new();
        let readings = voltage.unwrap_or_else(|e| {
            warn!("[dashboard] /api/voltage: {e}");
            failures.push(e.to_string());
            None
        });
        self.core.apply_readings(readings.as_deref());

        let history = history.unwrap_or_else(|e| {
            warn!("[dashboard] /api/history: {e}");
            failures.push(e.to_string());
            Vec::new()
        });
        let stats = stats.unwrap_or_else(|e| {
            warn!("[dashboard] /api/dashboard: {e}");
            failures.push(e.to_string());
            None
        });
        {
            let mut view = self.core.view.lock();
            view.history = history;
            view.stats = stats;
            view.stats_updated = Some(OffsetDateTime::now_utc());
        }

        if let Some(first) = failures.first() {
            self.notify(Notice::warning(
                TITLE_LOAD_FAILED,
                format!("{first}. Ensure backend is running and accessible."),
            ));
        }
    }

    /// Rafraîchissement manuel : panneaux advisory vidés puis fetch complet
    pub async fn refresh(&self) {
        self.core.view.lock().panels.clear();
        self.notify(Notice::info(TITLE_REFRESHING, "Fetching latest data from backend..."));
        self.fetch_full().await;
    }

    /// Reconnexion explicite : nouveau lien live puis sonde matérielle
    pub async fn connect(&self) -> ConnectionStatus {
        let Some(backend) = self.backend.clone() else {
            self.missing_backend_url();
            return ConnectionStatus::Error;
        };
        self.open_link();
        let event = match backend.probe().await {
            Ok(message) => ConnectionEvent::ProbeSucceeded { message },
            Err(e) => ConnectionEvent::ProbeFailed { message: e.to_string() },
        };
        self.core.apply_event(&event)
    }

    pub async fn save_settings(&self, settings: Settings) -> Result<(), SettingsError> {
        self.settings_store.save(&settings).await?;
        let interval_changed = {
            let mut view = self.core.view.lock();
            let changed = view.settings.live_update_interval_secs != settings.live_update_interval_secs;
            view.settings = settings;
            changed
        };
        self.notify(Notice::info("Settings Saved", "Voltage thresholds and update interval saved."));
        // le polling doit reprendre le nouvel intervalle
        if interval_changed && self.config.live_mode == LiveMode::Poll && self.link_open() {
            self.open_link();
        }
        Ok(())
    }

    // --- advisory ---

    fn current_voltages(&self) -> Vec<f64> {
        self.core.reconciler.lock().current().iter().map(|c| c.voltage).collect()
    }

    pub async fn run_diagnostic(
        &self,
        user_context: Option<String>,
    ) -> Result<AdvisoryResult<DiagnosticReport>, AdvisoryError> {
        let _guard = self
            .generating
            .try_start(AdvisoryFeature::Diagnostic)
            .ok_or(AdvisoryError::Busy(AdvisoryFeature::Diagnostic))?;
        self.core.view.lock().panels.diagnostic = None;

        let voltages = self.current_voltages();
        let result = self.advisory.diagnostic_report(&voltages, user_context).await;
        let notice = self.core.view.lock().panels.apply_diagnostic(result.clone());
        self.notify(notice);
        Ok(result)
    }

    pub async fn run_advice(&self, user_context: Option<String>) -> Result<AdvisoryResult<String>, AdvisoryError> {
        let _guard = self
            .generating
            .try_start(AdvisoryFeature::Advice)
            .ok_or(AdvisoryError::Busy(AdvisoryFeature::Advice))?;
        self.core.view.lock().panels.advice = None;

        let voltages = self.current_voltages();
        let result = self.advisory.usage_advice(&voltages, user_context).await;
        let notice = self.core.view.lock().panels.apply_advice(result.clone());
        self.notify(notice);
        Ok(result)
    }

    /// Alertes prédictives : garde grossière 2*N sur l'historique total,
    /// puis fenêtres récentes des cellules qui ont au moins 2 points
    pub async fn run_predictive(&self) -> Result<AdvisoryResult<PredictiveAlerts>, AdvisoryError> {
        let _guard = self
            .generating
            .try_start(AdvisoryFeature::Predictive)
            .ok_or(AdvisoryError::Busy(AdvisoryFeature::Predictive))?;

        let history = self.core.view.lock().history.clone();
        let cell_count = self.config.cell_count;
        if !has_sufficient_history(&history, cell_count) {
            let message = "More historical data is needed for predictive alerts.";
            self.notify(Notice::error(TITLE_NOT_ENOUGH_DATA, message));
            return Ok(AdvisoryResult::Failure(message.into()));
        }
        let recent = recent_history_per_cell(&history, cell_count);
        if recent.is_empty() {
            let message = "Could not prepare recent data for all cells.";
            self.notify(Notice::error(TITLE_NOT_ENOUGH_RECENT, message));
            return Ok(AdvisoryResult::Failure(message.into()));
        }

        self.core.view.lock().panels.alerts.clear();
        let result = self.advisory.predictive_alerts(recent).await;
        let notice = self.core.view.lock().panels.apply_predictive(result.clone());
        self.notify(notice);
        Ok(result)
    }

    // --- vues ---

    pub fn cells(&self) -> CellsView {
        let (cells, last_updated, revision) = {
            let reconciler = self.core.reconciler.lock();
            (reconciler.current(), reconciler.last_updated(), reconciler.revision())
        };
        let thresholds = self.core.view.lock().settings.thresholds;
        CellsView {
            cells: cells.iter().map(|c| CellCard::from_reading(c, &thresholds)).collect(),
            last_updated: last_updated.and_then(|t| t.format(&Rfc3339).ok()),
            revision,
        }
    }

    pub fn cell_detail(&self, cell: u32) -> Option<CellDetail> {
        let cells = self.core.reconciler.lock().current();
        let reading = cells.iter().find(|c| c.cell == cell)?;
        let view = snapshot(&self.core.view);
        Some(CellDetail {
            card: CellCard::from_reading(reading, &view.settings.thresholds),
            stats: cell_stats(&view.history, cell),
            history: cell_history(&view.history, cell),
        })
    }

    pub fn pack_summary(&self) -> PackSummary {
        let cells = self.core.reconciler.lock().current();
        let thresholds = self.core.view.lock().settings.thresholds;
        PackSummary::from_cells(&cells, &thresholds)
    }

    pub fn history(&self) -> Vec<VoltageHistoryEntry> {
        self.core.view.lock().history.clone()
    }

    pub fn dashboard_stats(&self) -> DashboardView {
        let view = self.core.view.lock();
        DashboardView {
            stats: view.stats.clone(),
            last_updated: view.stats_updated.and_then(|t| t.format(&Rfc3339).ok()),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.core.view.lock().status
    }

    pub fn connection(&self) -> ConnectionView {
        ConnectionView {
            status: self.status(),
            backend_url: self.backend.as_ref().map(|b| b.base_url().to_string()),
            live_mode: self.config.live_mode,
            link_open: self.link_open(),
            link_generation: self.link.lock().as_ref().map(LiveLink::generation),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.core.notifications.lock().list()
    }

    pub fn count_notifications(&self, title: &str) -> usize {
        self.core.notifications.lock().count_titled(title)
    }

    pub fn settings(&self) -> Settings {
        self.core.view.lock().settings
    }

    pub fn advisory_view(&self) -> AdvisoryView {
        AdvisoryView {
            configured: self.advisory.is_configured(),
            panels: self.core.view.lock().panels.clone(),
            generating: GeneratingView {
                diagnostic: self.generating.is_running(AdvisoryFeature::Diagnostic),
                advice: self.generating.is_running(AdvisoryFeature::Advice),
                predictive: self.generating.is_running(AdvisoryFeature::Predictive),
            },
        }
    }

    pub fn download_url(&self) -> Option<String> {
        self.backend.as_ref().map(BackendClient::download_url)
    }

    /// Observateurs réveillés uniquement sur changement réel du tableau
    pub fn subscribe(&self) -> watch::Receiver<CellArray> {
        self.core.reconciler.lock().subscribe()
    }

    pub fn health(&self) -> MonitorHealth {
        let (accepted, suppressed, last_update) = {
            let r = self.core.reconciler.lock();
            (r.revision(), r.suppressed(), r.last_updated())
        };
        MonitorHealth {
            uptime_seconds: self.health.uptime_seconds(),
            backend_configured: self.backend.is_some(),
            advisory_configured: self.advisory.is_configured(),
            connection_status: self.status(),
            live_links_opened: self.health.live_links_opened(),
            accepted_updates: accepted,
            suppressed_updates: suppressed,
            last_update: last_update.and_then(|t| t.format(&Rfc3339).ok()),
            memory_usage_mb: memory_usage_mb(),
        }
    }

    fn notify(&self, notice: Notice) {
        self.core.notifications.lock().emit(notice);
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{TITLE_LIVE_ACTIVE, TITLE_LIVE_FAILED, TITLE_URL_MISSING};
    use crate::thresholds::{CellStatus, VoltageThresholds};
    use packwatch_devkit::{eventually, fixtures, AdvisoryFixture, AdvisoryStub, BackendFixture, BackendStub};
    use tempfile::TempDir;

    fn config_for(dir: &TempDir, backend: Option<&str>, advisory: Option<&str>) -> MonitorConfig {
        MonitorConfig {
            backend_url: backend.map(str::to_string),
            advisory_url: advisory.map(str::to_string),
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..MonitorConfig::default()
        }
    }

    async fn wait_for(dashboard: &Dashboard, pred: impl Fn(&Dashboard) -> bool) {
        let reached = eventually(Duration::from_secs(3), || pred(dashboard)).await;
        assert!(
            reached,
            "condition not reached; status {:?}, notifications {:?}",
            dashboard.status(),
            dashboard.notifications()
        );
    }

    #[tokio::test]
    async fn test_missing_backend_url_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, None, None));
        dashboard.mount().await;

        assert_eq!(dashboard.status(), ConnectionStatus::Error);
        assert!(!dashboard.connection().link_open);
        let notices = dashboard.notifications();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].notice.title, TITLE_URL_MISSING);
        assert!(notices[0].notice.persistent);

        assert!(dashboard.history().is_empty());
        assert!(dashboard.dashboard_stats().stats.is_none());
        assert!(dashboard.cells().cells.iter().all(|c| c.voltage == 0.0 && !c.reported));

        // refresh repasse par la même garde, sans nouvelle notif
        dashboard.refresh().await;
        assert_eq!(dashboard.count_notifications(TITLE_URL_MISSING), 1);
        assert_eq!(dashboard.connect().await, ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_mount_streams_and_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), None));
        dashboard.mount().await;

        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Streaming).await;
        assert_eq!(dashboard.count_notifications(TITLE_LIVE_ACTIVE), 1);
        assert!(!dashboard.history().is_empty());
        assert_eq!(dashboard.dashboard_stats().stats.map(|s| s.total_readings), Some(120));

        let cells = dashboard.cells();
        assert_eq!(cells.cells.len(), 4);
        assert_eq!(cells.cells[0].voltage, 3.9);
        assert!(cells.last_updated.is_some());

        // les frames identiques suivantes sont absorbées
        wait_for(&dashboard, |d| d.health().suppressed_updates >= 2).await;
        assert_eq!(dashboard.cells().revision, cells.revision);
        assert_eq!(dashboard.count_notifications(TITLE_LIVE_ACTIVE), 1);
    }

    #[tokio::test]
    async fn test_signals_from_closed_link_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), None));
        dashboard.mount().await;
        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Streaming).await;

        let old_generation = dashboard.connection().link_generation.unwrap();
        dashboard.unmount();
        assert!(!dashboard.connection().link_open);
        let revision = dashboard.cells().revision;
        let notices = dashboard.notifications().len();

        dashboard.core.on_event(old_generation, ConnectionEvent::TransportError { reason: "late".into() });
        dashboard.core.on_readings(old_generation, Some(vec![IncomingReading::new(1, Some(3.1))]));

        assert_eq!(dashboard.status(), ConnectionStatus::Streaming);
        assert_eq!(dashboard.cells().revision, revision);
        assert_eq!(dashboard.cells().cells[0].voltage, 3.9);
        assert_eq!(dashboard.notifications().len(), notices);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reopen_keeps_current_link() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let dashboard = Arc::new(Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), None)));
        dashboard.mount().await;

        let openers: Vec<_> = (0..16)
            .map(|_| {
                let dashboard = dashboard.clone();
                tokio::task::spawn_blocking(move || dashboard.open_link())
            })
            .collect();
        for opener in openers {
            opener.await.unwrap();
        }

        let current = dashboard.core.generation.load(Ordering::Acquire);
        assert_eq!(dashboard.connection().link_generation, Some(current));
        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Streaming).await;
    }

    #[tokio::test]
    async fn test_partial_stream_update_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = BackendFixture::healthy()
            .with_stream(vec![fixtures::success_frame(&[(1, Some(3.9)), (2, Some(3.1))])]);
        let stub = BackendStub::start(fixture).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), None));
        dashboard.mount().await;

        wait_for(&dashboard, |d| {
            d.cells().cells.iter().map(|c| c.voltage).collect::<Vec<_>>() == vec![3.9, 3.1, 0.0, 0.0]
        })
        .await;
        let cells = dashboard.cells().cells;
        assert_eq!(cells[0].status, CellStatus::Normal);
        assert_eq!(cells[1].status, CellStatus::CriticalLow);
        assert_eq!(cells[3].ain_channel, "AIN3");
    }

    #[tokio::test]
    async fn test_unreachable_backend_goes_to_error_once() {
        let dir = tempfile::tempdir().unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some("http://127.0.0.1:9"), None));
        dashboard.mount().await;

        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Error).await;
        assert_eq!(dashboard.count_notifications(TITLE_LIVE_FAILED), 1);
        assert_eq!(dashboard.count_notifications(TITLE_LOAD_FAILED), 1);
        assert!(dashboard.history().is_empty());
        assert!(dashboard.dashboard_stats().stats.is_none());

        // un refresh ne fait pas sortir de error
        dashboard.refresh().await;
        assert_eq!(dashboard.status(), ConnectionStatus::Error);
        assert_eq!(dashboard.count_notifications(TITLE_LIVE_FAILED), 1);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_link_and_probes() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), None));
        dashboard.mount().await;
        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Streaming).await;

        dashboard.connect().await;
        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Streaming).await;
        assert_eq!(dashboard.health().live_links_opened, 2);
        assert_eq!(dashboard.count_notifications(crate::connection::TITLE_PROBE_OK), 1);
        assert_eq!(dashboard.count_notifications(TITLE_LIVE_ACTIVE), 2);

        dashboard.unmount();
        assert!(!dashboard.connection().link_open);
    }

    #[tokio::test]
    async fn test_poll_mode_enters_polling() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let mut config = config_for(&dir, Some(&stub.base_url()), None);
        config.live_mode = LiveMode::Poll;
        let dashboard = Dashboard::from_config(config);
        dashboard.mount().await;

        wait_for(&dashboard, |d| d.status() == ConnectionStatus::Polling).await;
        assert_eq!(dashboard.count_notifications(crate::connection::TITLE_POLLING_ACTIVE), 1);
    }

    #[tokio::test]
    async fn test_settings_loaded_at_mount_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, None, None));
        dashboard.mount().await;
        assert_eq!(dashboard.settings(), Settings::default());

        let custom = Settings {
            thresholds: VoltageThresholds { critical_low: 3.0, warning_low: 3.5, normal_max: 4.0, warning_high: 4.1 },
            live_update_interval_secs: 2,
        };
        dashboard.save_settings(custom).await.unwrap();

        let remounted = Dashboard::from_config(config_for(&dir, None, None));
        remounted.mount().await;
        assert_eq!(remounted.settings(), custom);

        let bad = Settings {
            thresholds: VoltageThresholds { critical_low: 4.0, ..custom.thresholds },
            ..custom
        };
        assert!(dashboard.save_settings(bad).await.is_err());
        assert_eq!(dashboard.settings(), custom);
    }

    #[tokio::test]
    async fn test_refresh_clears_panels() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let advisory = AdvisoryStub::start(AdvisoryFixture::default()).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), Some(&advisory.base_url())));
        dashboard.mount().await;

        assert!(dashboard.run_advice(None).await.unwrap().is_success());
        assert!(dashboard.advisory_view().panels.advice.is_some());

        dashboard.refresh().await;
        assert_eq!(dashboard.advisory_view().panels, AdvisoryPanels::default());
        assert_eq!(dashboard.count_notifications(TITLE_REFRESHING), 1);
    }

    #[tokio::test]
    async fn test_diagnostic_failure_fills_panel() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let advisory = AdvisoryStub::start(AdvisoryFixture::failing(500)).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), Some(&advisory.base_url())));
        dashboard.mount().await;

        let result = dashboard.run_diagnostic(Some("e-bike pack".into())).await.unwrap();
        assert!(!result.is_success());
        let panels = dashboard.advisory_view().panels;
        let summary = panels.diagnostic.map(|r| r.report_summary).unwrap_or_default();
        assert!(summary.starts_with("Failed to generate report. "));
        assert_eq!(dashboard.count_notifications("Report Generation Failed"), 1);
    }

    #[tokio::test]
    async fn test_same_feature_refused_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let stub = BackendStub::start(BackendFixture::healthy()).await.unwrap();
        let advisory = AdvisoryStub::start(AdvisoryFixture::default().delayed(Duration::from_millis(300)))
            .await
            .unwrap();
        let dashboard = Arc::new(Dashboard::from_config(config_for(
            &dir,
            Some(&stub.base_url()),
            Some(&advisory.base_url()),
        )));
        dashboard.mount().await;

        let first = {
            let dashboard = dashboard.clone();
            tokio::spawn(async move { dashboard.run_diagnostic(None).await })
        };
        wait_for(&dashboard, |d| d.advisory_view().generating.diagnostic).await;

        assert_eq!(
            dashboard.run_diagnostic(None).await,
            Err(AdvisoryError::Busy(AdvisoryFeature::Diagnostic))
        );
        // une autre fonctionnalité peut tourner en même temps
        assert!(dashboard.run_advice(None).await.unwrap().is_success());

        assert!(first.await.unwrap().unwrap().is_success());
        assert!(!dashboard.advisory_view().generating.diagnostic);
    }

    #[tokio::test]
    async fn test_predictive_gate_and_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        // 3 entrées cellule 1, 1 entrée cellule 2, N = 2
        let fixture = BackendFixture::healthy().with_history(fixtures::history_json(&[
            (1, Some(3.9)),
            (2, Some(3.7)),
            (1, Some(3.88)),
            (1, Some(3.86)),
        ]));
        let stub = BackendStub::start(fixture).await.unwrap();
        let advisory = AdvisoryStub::start(AdvisoryFixture::default()).await.unwrap();
        let mut config = config_for(&dir, Some(&stub.base_url()), Some(&advisory.base_url()));
        config.cell_count = 2;
        let dashboard = Dashboard::from_config(config);
        dashboard.mount().await;

        let result = dashboard.run_predictive().await.unwrap();
        assert!(result.is_success());
        let body = advisory.last_request("/predictive-alerts").unwrap();
        let cells = body["all_cells_recent_history"].as_array().unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0]["cell"], 1);
        assert_eq!(cells[0]["recent_voltages"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_predictive_short_history_refused_locally() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = BackendFixture::healthy().with_history(fixtures::history_json(&[(1, Some(3.9))]));
        let stub = BackendStub::start(fixture).await.unwrap();
        let advisory = AdvisoryStub::start(AdvisoryFixture::default()).await.unwrap();
        let dashboard = Dashboard::from_config(config_for(&dir, Some(&stub.base_url()), Some(&advisory.base_url())));
        dashboard.mount().await;

        let result = dashboard.run_predictive().await.unwrap();
        assert!(!result.is_success());
        assert_eq!(dashboard.count_notifications(TITLE_NOT_ENOUGH_DATA), 1);
        assert!(advisory.last_request("/predictive-alerts").is_none());
    }
}
