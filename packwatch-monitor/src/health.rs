use crate::connection::ConnectionStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorHealth {
    pub uptime_seconds: u64,
    pub backend_configured: bool,
    pub advisory_configured: bool,
    pub connection_status: ConnectionStatus,
    pub live_links_opened: u32,
    pub accepted_updates: u64,
    pub suppressed_updates: u64,
    pub last_update: Option<String>,
    pub memory_usage_mb: f32,
}

/// Compteurs de vie du process, partagés entre tâches
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    live_links: Arc<AtomicU32>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            live_links: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn increment_links(&self) {
        self.live_links.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn live_links_opened(&self) -> u32 {
        self.live_links.load(Ordering::Relaxed)
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    // approximation hors linux
    0.0
}
