//! Service layer orchestrating domain operations and infrastructure adapters.

mod catalog;
mod dispatcher;
mod navigator;
pub mod sample_data;
mod search;
pub mod store;
#[cfg(test)]
mod test_support;

pub use catalog::{
    definition, description, function_definitions, FunctionDefinition, PATIENT_DATA_TYPES,
};
pub use dispatcher::{error_payload, DispatchConfig, FunctionCall, FunctionDispatcher};
pub use navigator::{estimate_eta, DisabledClassifier, FunctionClassifier, NavigatorService};
pub use search::SearchEngine;
pub use store::FacilityStore;
