//! Infrastructure layer wiring concrete adapters (storage, classifier client).

pub mod http_client;
pub mod storage;

pub use http_client::{ClassifierConfig, CredentialSources, GorillaClassifier};
pub use storage::SledFacilityStore;
