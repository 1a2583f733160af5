//! Domain layer: facility entities, typed attributes and geo helpers for CareNav.

pub mod errors;
pub mod geo;
pub mod models;

pub use errors::DomainError;
pub use geo::{distance_miles, Coordinates};
pub use models::{
    Appointment, AttributeType, AttributeValue, Facility, FacilityDraft, FacilityMatch,
    FacilityRecord, FacilityType, FunctionKind, SearchCriteria, APPOINTMENTS_ATTRIBUTE,
};
