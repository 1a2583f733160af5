use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    application::services::PATIENT_DATA_TYPES,
    domain::{AttributeValue, Coordinates, FacilityMatch, FacilityRecord, FacilityType},
};

/// Arguments of `find_healthcare_facilities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FindFacilitiesArgs {
    /// Location name, address, or coordinates (lat,lon)
    pub location: String,
    /// Type of facility (hospital, clinic, pharmacy, urgent_care, etc.)
    #[serde(default)]
    #[schemars(extend("enum" = FacilityType::ALL))]
    pub facility_type: Option<String>,
    /// Specific service needed (e.g., cardiology, pediatrics, mental_health)
    #[serde(default)]
    pub service: Option<String>,
    /// Search radius in miles (default: 10)
    #[serde(default, deserialize_with = "lenient_radius")]
    #[schemars(with = "Option<f64>")]
    pub radius: Option<f64>,
}

/// Arguments of `get_facility_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FacilityDetailsArgs {
    /// Unique identifier of the facility
    pub facility_id: String,
}

/// Arguments of `search_facilities_by_service`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceSearchArgs {
    /// Service name (e.g., MRI, vaccination, dental, therapy)
    pub service: String,
    /// Location to search around
    pub location: String,
    /// Search radius in miles
    #[serde(default, deserialize_with = "lenient_radius")]
    #[schemars(with = "Option<f64>")]
    pub radius: Option<f64>,
}

/// Arguments of `get_patient_health_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatientDataArgs {
    /// Unique patient identifier
    pub patient_id: String,
    /// Type of data to retrieve
    #[serde(default = "default_data_type")]
    #[schemars(extend("enum" = PATIENT_DATA_TYPES))]
    pub data_type: String,
}

/// Arguments of `schedule_appointment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleAppointmentArgs {
    /// ID of the healthcare facility
    pub facility_id: String,
    /// Type of service or appointment
    pub service_type: String,
    /// Preferred date, ideally YYYY-MM-DD
    pub date: String,
    /// Patient identifier
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// Accepts `5`, `"5"` or `"5 miles"`. Classifier output is not always typed.
fn lenient_radius<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Radius {
        Number(f64),
        Text(String),
    }

    match Option::<Radius>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Radius::Number(miles)) => Ok(Some(miles)),
        Some(Radius::Text(text)) => {
            let lower = text.trim().to_ascii_lowercase();
            let number = ["miles", "mile", "mi"]
                .iter()
                .find_map(|unit| lower.strip_suffix(unit))
                .unwrap_or(&lower)
                .trim();
            if number.is_empty() {
                return Ok(None);
            }
            number
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("radius {text:?} is not a number of miles")))
        }
    }
}

/// Facility projection returned by the search-style functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySummaryDto {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub facility_type: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub services: Vec<String>,
    pub rating: Option<f64>,
    pub phone: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
}

impl From<FacilityMatch> for FacilitySummaryDto {
    fn from(value: FacilityMatch) -> Self {
        let FacilityRecord {
            facility,
            services,
            attributes,
        } = value.record;
        Self {
            coordinates: facility.coordinates(),
            id: facility.id,
            name: facility.name,
            facility_type: facility.facility_type,
            address: facility.address,
            services,
            rating: facility.rating,
            phone: facility.phone,
            attributes,
            distance_miles: value.distance_miles,
        }
    }
}

/// Envelope for `find_healthcare_facilities` and `search_facilities_by_service`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySearchResponse {
    pub location: String,
    pub radius_miles: f64,
    pub facilities_found: usize,
    pub facilities: Vec<FacilitySummaryDto>,
}

/// Full facility view returned by `get_facility_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityDetailsResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub facility_type: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub services: Vec<String>,
    pub rating: Option<f64>,
    pub phone: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub full_details: bool,
}

impl From<FacilityRecord> for FacilityDetailsResponse {
    fn from(value: FacilityRecord) -> Self {
        let FacilityRecord {
            facility,
            services,
            attributes,
        } = value;
        Self {
            coordinates: facility.coordinates(),
            id: facility.id,
            name: facility.name,
            facility_type: facility.facility_type,
            address: facility.address,
            services,
            rating: facility.rating,
            phone: facility.phone,
            attributes,
            created_at: facility.created_at,
            updated_at: facility.updated_at,
            full_details: true,
        }
    }
}

/// Placeholder answer for patient data lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDataResponse {
    pub patient_id: String,
    pub data_type: String,
    pub message: String,
    pub note: String,
}

/// Confirmation returned by `schedule_appointment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentConfirmation {
    pub success: bool,
    pub appointment_id: String,
    pub facility: String,
    pub facility_id: String,
    pub service: String,
    pub date: String,
    pub patient_id: Option<String>,
    pub status: String,
    pub message: String,
}

/// A `{name, arguments}` pair produced by the external classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Normalises the shapes classifiers answer with.
    ///
    /// Accepts a `function_call` wrapper or a bare object, `name` or
    /// `function` for the name, `arguments` or `args` for the arguments.
    /// Arguments sent as a JSON string are parsed, falling back to `{}`.
    pub fn from_response(response: &Value) -> Option<Self> {
        let call = response
            .get("function_call")
            .filter(|inner| inner.is_object())
            .unwrap_or(response);

        let name = call
            .get("name")
            .or_else(|| call.get("function"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())?;

        let arguments = match call.get("arguments").or_else(|| call.get("args")) {
            Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
                .ok()
                .filter(Value::is_object)
                .unwrap_or_else(empty_object),
            Some(Value::Null) | None => empty_object(),
            Some(other) => other.clone(),
        };

        Some(Self::new(name, arguments))
    }
}

/// Result envelope of a natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub success: bool,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Emergency triage request coming from the map frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRequest {
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl TriageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: default_severity(),
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

/// One hospital suggestion in a triage answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub name: String,
    pub eta: String,
    pub tags: Vec<String>,
    pub lat: f64,
    pub lng: f64,
    pub distance: Option<f64>,
    pub rating: Option<f64>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResponse {
    pub message: String,
    pub recommendations: Vec<Recommendation>,
}

/// Compact facility marker for map rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFacility {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub facility_type: String,
    pub rating: Option<f64>,
    pub phone: Option<String>,
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    pub details: Option<String>,
}

pub fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_data_type() -> String {
    "all".into()
}

fn default_severity() -> String {
    "critical".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_wrapped_function_calls() {
        let response = json!({
            "function_call": {"name": "get_facility_details", "arguments": {"facility_id": "hosp_001"}}
        });
        let call = FunctionCallRequest::from_response(&response).unwrap();
        assert_eq!(call.name, "get_facility_details");
        assert_eq!(call.arguments, json!({"facility_id": "hosp_001"}));
    }

    #[test]
    fn reads_bare_calls_with_alternate_keys_and_string_arguments() {
        let response = json!({"function": "schedule_appointment", "args": "{\"date\": \"2024-12-15\"}"});
        let call = FunctionCallRequest::from_response(&response).unwrap();
        assert_eq!(call.name, "schedule_appointment");
        assert_eq!(call.arguments, json!({"date": "2024-12-15"}));
    }

    #[test]
    fn malformed_string_arguments_become_empty() {
        let response = json!({"name": "find_healthcare_facilities", "arguments": "not json"});
        let call = FunctionCallRequest::from_response(&response).unwrap();
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn responses_without_a_name_are_rejected() {
        assert!(FunctionCallRequest::from_response(&json!({"arguments": {}})).is_none());
        assert!(FunctionCallRequest::from_response(&json!("find")).is_none());
    }

    #[test]
    fn optional_arguments_take_defaults() {
        let args: PatientDataArgs = serde_json::from_value(json!({"patient_id": "p1"})).unwrap();
        assert_eq!(args.data_type, "all");
        let triage: TriageRequest = serde_json::from_value(json!({"message": "chest pain"})).unwrap();
        assert_eq!(triage.severity, "critical");
    }

    #[test]
    fn missing_required_arguments_fail_to_parse() {
        let err = serde_json::from_value::<FindFacilitiesArgs>(json!({"service": "mri"})).unwrap_err();
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn radius_accepts_numbers_and_numeric_text() {
        let parse = |radius: Value| {
            serde_json::from_value::<FindFacilitiesArgs>(json!({"location": "downtown", "radius": radius}))
                .map(|args| args.radius)
        };
        assert_eq!(parse(json!(5)).unwrap(), Some(5.0));
        assert_eq!(parse(json!("5")).unwrap(), Some(5.0));
        assert_eq!(parse(json!("2.5 miles")).unwrap(), Some(2.5));
        assert_eq!(parse(json!("")).unwrap(), None);
        assert_eq!(parse(Value::Null).unwrap(), None);
        assert!(parse(json!("far away")).is_err());

        let args: ServiceSearchArgs =
            serde_json::from_value(json!({"service": "mri", "location": "x", "radius": "15"})).unwrap();
        assert_eq!(args.radius, Some(15.0));
    }
}
