//! Storage adapters for CareNav.
//!
//! The embedded sled-backed facility store is the only persistence engine.

pub mod sled_store;

pub use sled_store::SledFacilityStore;
