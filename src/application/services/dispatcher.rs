use std::sync::Arc;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    application::{
        dtos::{
            empty_object, AppointmentConfirmation, FacilityDetailsArgs, FacilityDetailsResponse,
            FacilitySearchResponse, FacilitySummaryDto, FindFacilitiesArgs, PatientDataArgs,
            PatientDataResponse, ScheduleAppointmentArgs, ServiceSearchArgs,
        },
        services::{catalog::PATIENT_DATA_TYPES, FacilityStore, SearchEngine},
    },
    domain::{
        Appointment, AttributeValue, Coordinates, DomainError, FunctionKind, SearchCriteria,
        APPOINTMENTS_ATTRIBUTE,
    },
};

/// Tunables for the dispatcher's argument defaults.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub default_radius_miles: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_radius_miles: 10.0,
        }
    }
}

/// A fully typed function call.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCall {
    FindHealthcareFacilities(FindFacilitiesArgs),
    GetFacilityDetails(FacilityDetailsArgs),
    SearchFacilitiesByService(ServiceSearchArgs),
    GetPatientHealthData(PatientDataArgs),
    ScheduleAppointment(ScheduleAppointmentArgs),
}

impl FunctionCall {
    /// Types loose JSON arguments for `kind`. A missing `arguments` value is
    /// treated as an empty object.
    pub fn parse(kind: FunctionKind, arguments: Value) -> Result<Self, DomainError> {
        let arguments = if arguments.is_null() {
            empty_object()
        } else {
            arguments
        };

        let call = match kind {
            FunctionKind::FindHealthcareFacilities => {
                FunctionCall::FindHealthcareFacilities(typed(kind, arguments)?)
            }
            FunctionKind::GetFacilityDetails => {
                FunctionCall::GetFacilityDetails(typed(kind, arguments)?)
            }
            FunctionKind::SearchFacilitiesByService => {
                FunctionCall::SearchFacilitiesByService(typed(kind, arguments)?)
            }
            FunctionKind::GetPatientHealthData => {
                FunctionCall::GetPatientHealthData(typed(kind, arguments)?)
            }
            FunctionKind::ScheduleAppointment => {
                FunctionCall::ScheduleAppointment(typed(kind, arguments)?)
            }
        };
        Ok(call)
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            FunctionCall::FindHealthcareFacilities(_) => FunctionKind::FindHealthcareFacilities,
            FunctionCall::GetFacilityDetails(_) => FunctionKind::GetFacilityDetails,
            FunctionCall::SearchFacilitiesByService(_) => FunctionKind::SearchFacilitiesByService,
            FunctionCall::GetPatientHealthData(_) => FunctionKind::GetPatientHealthData,
            FunctionCall::ScheduleAppointment(_) => FunctionKind::ScheduleAppointment,
        }
    }
}

fn typed<T: DeserializeOwned>(kind: FunctionKind, arguments: Value) -> Result<T, DomainError> {
    serde_json::from_value(arguments)
        .map_err(|err| DomainError::validation(format!("invalid arguments for {kind}: {err}")))
}

/// Routes symbolic function calls onto store and search operations.
pub struct FunctionDispatcher {
    store: Arc<dyn FacilityStore>,
    search: SearchEngine,
    config: DispatchConfig,
}

impl FunctionDispatcher {
    pub fn new(store: Arc<dyn FacilityStore>, config: DispatchConfig) -> Self {
        Self {
            search: SearchEngine::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    /// Runs `name` with `arguments`. Never fails: every error comes back as an
    /// `{"error": ..., "code": ...}` payload.
    pub fn dispatch(&self, name: &str, arguments: Value) -> Value {
        match self.try_dispatch(name, arguments) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "carenav::dispatch", function = name, error = %err, "dispatch failed");
                error_payload(&err)
            }
        }
    }

    pub fn try_dispatch(&self, name: &str, arguments: Value) -> Result<Value, DomainError> {
        let kind: FunctionKind = name.trim().parse()?;
        let call = FunctionCall::parse(kind, arguments)?;
        self.execute(call)
    }

    pub fn execute(&self, call: FunctionCall) -> Result<Value, DomainError> {
        debug!(target: "carenav::dispatch", function = %call.kind(), "executing function call");
        match call {
            FunctionCall::FindHealthcareFacilities(args) => {
                to_payload(self.find_healthcare_facilities(args)?)
            }
            FunctionCall::GetFacilityDetails(args) => to_payload(self.get_facility_details(args)?),
            FunctionCall::SearchFacilitiesByService(args) => {
                to_payload(self.search_facilities_by_service(args)?)
            }
            FunctionCall::GetPatientHealthData(args) => {
                to_payload(self.get_patient_health_data(args)?)
            }
            FunctionCall::ScheduleAppointment(args) => to_payload(self.schedule_appointment(args)?),
        }
    }

    pub fn find_healthcare_facilities(
        &self,
        args: FindFacilitiesArgs,
    ) -> Result<FacilitySearchResponse, DomainError> {
        let location = args.location.trim();
        if location.is_empty() {
            return Err(DomainError::validation("location is required"));
        }
        let radius = args.radius.unwrap_or(self.config.default_radius_miles);
        if !radius.is_finite() || radius <= 0.0 {
            return Err(DomainError::validation(format!(
                "radius {radius} must be a positive number of miles"
            )));
        }

        let mut criteria = SearchCriteria {
            facility_type: non_blank(args.facility_type),
            service: non_blank(args.service),
            ..SearchCriteria::default()
        };
        // Free-text places are echoed back only; "lat,lon" narrows by radius.
        if let Some(origin) = Coordinates::parse(location) {
            criteria = criteria.near(origin, Some(radius));
        }

        let facilities: Vec<FacilitySummaryDto> = self
            .search
            .search(&criteria)?
            .into_iter()
            .map(FacilitySummaryDto::from)
            .collect();

        Ok(FacilitySearchResponse {
            location: location.to_string(),
            radius_miles: radius,
            facilities_found: facilities.len(),
            facilities,
        })
    }

    pub fn get_facility_details(
        &self,
        args: FacilityDetailsArgs,
    ) -> Result<FacilityDetailsResponse, DomainError> {
        self.store
            .get_facility(&args.facility_id)?
            .map(FacilityDetailsResponse::from)
            .ok_or_else(|| facility_not_found(&args.facility_id))
    }

    pub fn search_facilities_by_service(
        &self,
        args: ServiceSearchArgs,
    ) -> Result<FacilitySearchResponse, DomainError> {
        if args.service.trim().is_empty() {
            return Err(DomainError::validation("service is required"));
        }
        self.find_healthcare_facilities(FindFacilitiesArgs {
            location: args.location,
            facility_type: None,
            service: Some(args.service),
            radius: args.radius,
        })
    }

    pub fn get_patient_health_data(
        &self,
        args: PatientDataArgs,
    ) -> Result<PatientDataResponse, DomainError> {
        if args.patient_id.trim().is_empty() {
            return Err(DomainError::validation("patient_id is required"));
        }
        if !PATIENT_DATA_TYPES.contains(&args.data_type.as_str()) {
            return Err(DomainError::validation(format!(
                "data_type must be one of {}",
                PATIENT_DATA_TYPES.join(", ")
            )));
        }

        Ok(PatientDataResponse {
            patient_id: args.patient_id,
            data_type: args.data_type,
            message: "Patient data retrieval requires authentication".into(),
            note: "Patient records are not served by this facility map.".into(),
        })
    }

    /// Appends a scheduled appointment to the facility's `appointments` attribute.
    pub fn schedule_appointment(
        &self,
        args: ScheduleAppointmentArgs,
    ) -> Result<AppointmentConfirmation, DomainError> {
        if args.service_type.trim().is_empty() {
            return Err(DomainError::validation("service_type is required"));
        }
        // Classifier output is free text ("December 15, 2024"); it is stored as given.
        let date = args.date.trim().to_string();
        if date.is_empty() {
            return Err(DomainError::validation("date is required"));
        }

        let facility = self
            .store
            .get_facility(&args.facility_id)?
            .ok_or_else(|| facility_not_found(&args.facility_id))?;

        let base_id = format!("apt_{}", Utc::now().format("%Y%m%d%H%M%S%3f"));
        let mut appointment = Appointment {
            appointment_id: base_id.clone(),
            service_type: args.service_type.clone(),
            date: date.clone(),
            patient_id: args.patient_id.clone(),
            status: "scheduled".into(),
        };

        let facility_id = args.facility_id.as_str();
        self.store
            .modify_attribute(facility_id, APPOINTMENTS_ATTRIBUTE, &mut |current| {
                let mut entries = match current {
                    Some(AttributeValue::Json(Value::Array(entries))) => entries,
                    Some(other) => {
                        warn!(
                            target: "carenav::dispatch",
                            facility_id,
                            previous = ?other.kind(),
                            "appointments attribute was not a list; starting a new one"
                        );
                        Vec::new()
                    }
                    None => Vec::new(),
                };
                appointment.appointment_id = unique_appointment_id(&base_id, &entries);
                let entry = serde_json::to_value(&appointment).map_err(|err| {
                    DomainError::other(format!("failed to encode appointment: {err}"))
                })?;
                entries.push(entry);
                Ok(AttributeValue::Json(Value::Array(entries)))
            })
            .map_err(|err| match err {
                // The facility can vanish between the lookup and the write.
                DomainError::NotFound(_) => facility_not_found(facility_id),
                other => other,
            })?;

        info!(
            target: "carenav::dispatch",
            facility_id,
            appointment_id = %appointment.appointment_id,
            "appointment scheduled"
        );

        Ok(AppointmentConfirmation {
            success: true,
            appointment_id: appointment.appointment_id,
            facility: facility.facility.name,
            facility_id: args.facility_id,
            service: args.service_type,
            date,
            patient_id: args.patient_id,
            status: appointment.status,
            message: "Appointment scheduled successfully".into(),
        })
    }
}

/// `base`, or `base_N` when bookings in the same millisecond already hold it.
fn unique_appointment_id(base: &str, entries: &[Value]) -> String {
    let taken = |candidate: &str| {
        entries
            .iter()
            .any(|entry| entry.get("appointment_id").and_then(Value::as_str) == Some(candidate))
    };
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn facility_not_found(id: &str) -> DomainError {
    DomainError::not_found(format!("Facility {id} not found"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn to_payload<T: Serialize>(value: T) -> Result<Value, DomainError> {
    serde_json::to_value(value)
        .map_err(|err| DomainError::other(format!("failed to encode function result: {err}")))
}

/// Structured error body returned in place of a function result.
pub fn error_payload(err: &DomainError) -> Value {
    let (code, message) = match err {
        DomainError::Validation(msg) => ("validation", msg.clone()),
        DomainError::NotFound(msg) => ("not_found", msg.clone()),
        DomainError::UnknownOperation(_) => ("unknown_function", err.to_string()),
        DomainError::Codec(_) => ("codec", err.to_string()),
        DomainError::Storage(_) => ("storage", err.to_string()),
        DomainError::Other(_) => ("internal", err.to_string()),
    };
    json!({ "error": message, "code": code })
}
