/*!
# PackWatch DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement et les tests du moniteur sans matériel :
- Stub HTTP/SSE du backend d'acquisition batterie
- Stub du service advisory (diagnostic, conseils, alertes)
- Builders de payloads (lectures, frames SSE, historique, stats)
- Harness de test et attente active
*/

pub mod advisory_stub;
pub mod backend_stub;
pub mod fixtures;
pub mod test_utils;

pub use advisory_stub::{AdvisoryFixture, AdvisoryStub};
pub use backend_stub::{BackendFixture, BackendStub, Reply};
pub use test_utils::{eventually, TestHarness};
