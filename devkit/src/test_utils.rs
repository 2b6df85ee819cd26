/*!
Test Harness pour le moniteur PackWatch

Démarre les deux stubs (backend batterie + service advisory) et fournit
l'attente active utilisée par les tests asynchrones.
*/

use crate::advisory_stub::{AdvisoryFixture, AdvisoryStub};
use crate::backend_stub::{BackendFixture, BackendStub};
use anyhow::Result;
use std::time::{Duration, Instant};

/// Backend + advisory, arrêtés au Drop
pub struct TestHarness {
    pub backend: BackendStub,
    pub advisory: AdvisoryStub,
}

impl TestHarness {
    pub async fn start(backend: BackendFixture, advisory: AdvisoryFixture) -> Result<Self> {
        env_logger::try_init().ok(); // logs des stubs visibles avec RUST_LOG

        let backend = BackendStub::start(backend).await?;
        let advisory = AdvisoryStub::start(advisory).await?;
        log::info!("🧪 harness ready: backend {} / advisory {}", backend.base_url(), advisory.base_url());
        Ok(Self { backend, advisory })
    }

    /// Pack sain + advisory qui répond normalement
    pub async fn healthy() -> Result<Self> {
        Self::start(BackendFixture::healthy(), AdvisoryFixture::default()).await
    }

    pub fn backend_url(&self) -> String {
        self.backend.base_url()
    }

    pub fn advisory_url(&self) -> String {
        self.advisory.base_url()
    }
}

/// Vérifie `check` toutes les 20ms jusqu'au timeout ; `true` dès qu'il passe
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_eventually() {
        let calls = AtomicUsize::new(0);
        assert!(eventually(Duration::from_secs(1), || calls.fetch_add(1, Ordering::Relaxed) >= 3).await);
        assert!(!eventually(Duration::from_millis(60), || false).await);
    }

    #[tokio::test]
    async fn test_harness_starts_both_stubs() {
        let harness = TestHarness::healthy().await.unwrap();
        assert_ne!(harness.backend_url(), harness.advisory_url());
    }
}
