//! User-facing notifications (the dashboard "toasts").
//!
//! State transitions only *describe* notifications as [`Notice`] values; the
//! [`NotificationLog`] is where they are emitted: logged through `tracing`
//! and kept in a bounded buffer served by `GET /notifications`.

use serde::Serialize;
use std::collections::VecDeque;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Notification décrite par une transition, pas encore émise
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Reste affichée jusqu'à action de l'utilisateur (erreurs de configuration)
    pub persistent: bool,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { severity: Severity::Info, title: title.into(), description: description.into(), persistent: false }
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, title: title.into(), description: description.into(), persistent: false }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { severity: Severity::Error, title: title.into(), description: description.into(), persistent: false }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(flatten)]
    pub notice: Notice,
    pub at: String,
}

pub struct NotificationLog {
    capacity: usize,
    entries: VecDeque<Notification>,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::new() }
    }

    pub fn emit(&mut self, notice: Notice) {
        match notice.severity {
            Severity::Info => info!(title = %notice.title, "{}", notice.description),
            Severity::Warning => warn!(title = %notice.title, "{}", notice.description),
            Severity::Error => error!(title = %notice.title, "{}", notice.description),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Notification {
            id: Uuid::new_v4(),
            notice,
            at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        });
    }

    pub fn emit_all(&mut self, notices: impl IntoIterator<Item = Notice>) {
        for notice in notices {
            self.emit(notice);
        }
    }

    /// Plus récente en dernier
    pub fn list(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.entries.iter().filter(|n| n.notice.title == title).count()
    }
}
