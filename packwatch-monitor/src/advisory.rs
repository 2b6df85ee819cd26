//! Advisory gateway: diagnostic report, usage advice and predictive alerts.
//!
//! The external service sits behind [`AdvisoryService`]. [`AdvisoryGateway`]
//! validates inputs locally, calls the service and folds every outcome into an
//! [`AdvisoryResult`], so nothing past this boundary ever sees an error value.
//! [`AdvisoryPanels`] keeps what the dashboard shows for each feature and
//! [`Generating`] guards against running the same feature twice at once.

use crate::models::RecentCellHistory;
use crate::notify::Notice;
use async_trait::async_trait;
use serde::ser::SerializeStruct;
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdvisoryError {
    #[error("Invalid input: requires an array of {expected} cell voltages.")]
    WrongCellCount { expected: usize, got: usize },
    #[error("Invalid input: cell voltages must be finite numbers.")]
    NonFiniteVoltage,
    #[error("Invalid input: requires recent history for cells.")]
    EmptyHistory,
    #[error("Advisory service URL is not configured.")]
    NotConfigured,
    #[error("{0} generation is already in progress.")]
    Busy(AdvisoryFeature),
    #[error("advisory service unreachable: {0}")]
    Transport(String),
    #[error("advisory service returned HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryFeature {
    Diagnostic,
    Advice,
    Predictive,
}

impl std::fmt::Display for AdvisoryFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdvisoryFeature::Diagnostic => "Diagnostic report",
            AdvisoryFeature::Advice => "Usage advice",
            AdvisoryFeature::Predictive => "Predictive alerts",
        };
        f.write_str(name)
    }
}

// --- corps de requête ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellVoltagesRequest {
    pub cell_voltages: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictiveRequest {
    pub all_cells_recent_history: Vec<RecentCellHistory>,
}

// --- réponses du service ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<u32>,
    pub issue: String,
    pub potential_causes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub report_summary: String,
    #[serde(default)]
    pub detailed_anomalies: Vec<AnomalyDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAdvice {
    pub advice: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<u32>,
    pub message: String,
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveAlerts {
    pub alerts: Vec<PredictiveAlert>,
}

/// Union succès/erreur renvoyée au-delà de la frontière advisory.
/// Sérialisée en `{success: true, data}` ou `{success: false, error}`.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryResult<T> {
    Success(T),
    Failure(String),
}

impl<T> AdvisoryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, AdvisoryResult::Success(_))
    }
}

impl<T> From<Result<T, AdvisoryError>> for AdvisoryResult<T> {
    fn from(result: Result<T, AdvisoryError>) -> Self {
        match result {
            Ok(data) => AdvisoryResult::Success(data),
            Err(e) => AdvisoryResult::Failure(e.to_string()),
        }
    }
}

impl<T: Serialize> Serialize for AdvisoryResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AdvisoryResult", 2)?;
        match self {
            AdvisoryResult::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            AdvisoryResult::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

/// Service externe d'analyse (LLM ou autre)
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn diagnostic_report(&self, request: &CellVoltagesRequest) -> Result<DiagnosticReport, AdvisoryError>;

    async fn usage_advice(&self, request: &CellVoltagesRequest) -> Result<UsageAdvice, AdvisoryError>;

    async fn predictive_alerts(&self, request: &PredictiveRequest) -> Result<PredictiveAlerts, AdvisoryError>;
}

/// Implémentation HTTP : `POST {base}/diagnostic-report|usage-advice|predictive-alerts`
pub struct HttpAdvisoryService {
    base: String,
    http: reqwest::Client,
}

impl HttpAdvisoryService {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into(), http: reqwest::Client::new() }
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, AdvisoryError> {
        let url = format!("{}{}", self.base, path);
        debug!("[advisory] POST {url}");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AdvisoryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdvisoryError::Status(response.status().as_u16()));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| AdvisoryError::InvalidResponse(format!("malformed advisory response: {e}")))
    }
}

#[async_trait]
impl AdvisoryService for HttpAdvisoryService {
    async fn diagnostic_report(&self, request: &CellVoltagesRequest) -> Result<DiagnosticReport, AdvisoryError> {
        self.post("/diagnostic-report", request).await
    }

    async fn usage_advice(&self, request: &CellVoltagesRequest) -> Result<UsageAdvice, AdvisoryError> {
        self.post("/usage-advice", request).await
    }

    async fn predictive_alerts(&self, request: &PredictiveRequest) -> Result<PredictiveAlerts, AdvisoryError> {
        self.post("/predictive-alerts", request).await
    }
}

pub struct AdvisoryGateway {
    service: Option<Arc<dyn AdvisoryService>>,
    cell_count: usize,
}

impl AdvisoryGateway {
    pub fn new(service: Option<Arc<dyn AdvisoryService>>, cell_count: usize) -> Self {
        Self { service, cell_count }
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    fn check_voltages(&self, voltages: &[f64]) -> Result<(), AdvisoryError> {
        if voltages.len() != self.cell_count {
            return Err(AdvisoryError::WrongCellCount { expected: self.cell_count, got: voltages.len() });
        }
        if voltages.iter().any(|v| !v.is_finite()) {
            return Err(AdvisoryError::NonFiniteVoltage);
        }
        Ok(())
    }

    fn service(&self) -> Result<&Arc<dyn AdvisoryService>, AdvisoryError> {
        self.service.as_ref().ok_or(AdvisoryError::NotConfigured)
    }

    pub async fn diagnostic_report(
        &self,
        voltages: &[f64],
        user_context: Option<String>,
    ) -> AdvisoryResult<DiagnosticReport> {
        let outcome = self.request_report(voltages, user_context).await;
        log_failure(AdvisoryFeature::Diagnostic, &outcome);
        outcome.into()
    }

    pub async fn usage_advice(&self, voltages: &[f64], user_context: Option<String>) -> AdvisoryResult<String> {
        let outcome = self.request_advice(voltages, user_context).await;
        log_failure(AdvisoryFeature::Advice, &outcome);
        outcome.into()
    }

    pub async fn predictive_alerts(&self, history: Vec<RecentCellHistory>) -> AdvisoryResult<PredictiveAlerts> {
        let outcome = self.request_alerts(history).await;
        log_failure(AdvisoryFeature::Predictive, &outcome);
        outcome.into()
    }

    async fn request_report(
        &self,
        voltages: &[f64],
        user_context: Option<String>,
    ) -> Result<DiagnosticReport, AdvisoryError> {
        self.check_voltages(voltages)?;
        let request = CellVoltagesRequest { cell_voltages: voltages.to_vec(), user_context };
        let report = self.service()?.diagnostic_report(&request).await?;
        if report.report_summary.trim().is_empty() {
            return Err(AdvisoryError::InvalidResponse(
                "Advisory service did not return a valid report structure.".into(),
            ));
        }
        Ok(report)
    }

    async fn request_advice(&self, voltages: &[f64], user_context: Option<String>) -> Result<String, AdvisoryError> {
        self.check_voltages(voltages)?;
        let request = CellVoltagesRequest { cell_voltages: voltages.to_vec(), user_context };
        let advice = self.service()?.usage_advice(&request).await?;
        if advice.advice.trim().is_empty() {
            return Err(AdvisoryError::InvalidResponse("Advisory service did not return any advice.".into()));
        }
        Ok(advice.advice)
    }

    async fn request_alerts(&self, history: Vec<RecentCellHistory>) -> Result<PredictiveAlerts, AdvisoryError> {
        if history.is_empty() {
            return Err(AdvisoryError::EmptyHistory);
        }
        let request = PredictiveRequest { all_cells_recent_history: history };
        self.service()?.predictive_alerts(&request).await
    }
}

fn log_failure<T>(feature: AdvisoryFeature, outcome: &Result<T, AdvisoryError>) {
    if let Err(e) = outcome {
        warn!("[advisory] {feature} failed: {e}");
    }
}

/// Un drapeau "en cours" par fonctionnalité
#[derive(Default)]
pub struct Generating {
    diagnostic: AtomicBool,
    advice: AtomicBool,
    predictive: AtomicBool,
}

impl Generating {
    fn flag(&self, feature: AdvisoryFeature) -> &AtomicBool {
        match feature {
            AdvisoryFeature::Diagnostic => &self.diagnostic,
            AdvisoryFeature::Advice => &self.advice,
            AdvisoryFeature::Predictive => &self.predictive,
        }
    }

    /// `None` si la même fonctionnalité tourne déjà
    pub fn try_start(&self, feature: AdvisoryFeature) -> Option<GeneratingGuard<'_>> {
        self.flag(feature)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GeneratingGuard { flag: self.flag(feature) })
    }

    pub fn is_running(&self, feature: AdvisoryFeature) -> bool {
        self.flag(feature).load(Ordering::Acquire)
    }
}

pub struct GeneratingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Contenu affiché des trois panneaux advisory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvisoryPanels {
    pub diagnostic: Option<DiagnosticReport>,
    pub advice: Option<String>,
    pub alerts: Vec<PredictiveAlert>,
}

impl AdvisoryPanels {
    pub fn clear(&mut self) {
        *self = AdvisoryPanels::default();
    }

    pub fn apply_diagnostic(&mut self, result: AdvisoryResult<DiagnosticReport>) -> Notice {
        match result {
            AdvisoryResult::Success(report) => {
                self.diagnostic = Some(report);
                Notice::info("Diagnostic Report Generated", "Advisory analysis complete.")
            }
            AdvisoryResult::Failure(error) => {
                self.diagnostic = Some(DiagnosticReport {
                    report_summary: format!("Failed to generate report. {error}"),
                    detailed_anomalies: Vec::new(),
                });
                Notice::error("Report Generation Failed", error)
            }
        }
    }

    pub fn apply_advice(&mut self, result: AdvisoryResult<String>) -> Notice {
        match result {
            AdvisoryResult::Success(advice) => {
                self.advice = Some(advice);
                Notice::info("Usage Advice Generated", "")
            }
            AdvisoryResult::Failure(error) => {
                self.advice = Some(format!("Failed to generate advice. {error}"));
                Notice::error("Advice Generation Failed", error)
            }
        }
    }

    pub fn apply_predictive(&mut self, result: AdvisoryResult<PredictiveAlerts>) -> Notice {
        match result {
            AdvisoryResult::Success(data) => {
                let description = if data.alerts.is_empty() {
                    "No immediate predictive concerns found.".to_string()
                } else {
                    format!("{} alert(s) found.", data.alerts.len())
                };
                self.alerts = data.alerts;
                Notice::info("Predictive Alerts Checked", description)
            }
            AdvisoryResult::Failure(error) => {
                self.alerts.clear();
                Notice::error("Predictive Alert Failed", error)
            }
        }
    }
}
