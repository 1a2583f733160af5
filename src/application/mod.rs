//! Application layer wiring DTOs and services for CareNav.

pub mod dtos;
pub mod services;

pub use dtos::{
    FunctionCallRequest, HealthStatusResponse, MapFacility, QueryOutcome, TriageRequest,
    TriageResponse,
};
pub use services::{FacilityStore, FunctionDispatcher, NavigatorService, SearchEngine};
