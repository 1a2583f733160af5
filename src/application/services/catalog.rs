use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    application::dtos::{
        FacilityDetailsArgs, FindFacilitiesArgs, PatientDataArgs, ScheduleAppointmentArgs,
        ServiceSearchArgs,
    },
    domain::FunctionKind,
};

/// Patient record categories accepted by `get_patient_health_data`.
pub const PATIENT_DATA_TYPES: [&str; 5] = [
    "all",
    "appointments",
    "prescriptions",
    "lab_results",
    "conditions",
];

/// Describes one callable function: name, purpose and a JSON schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDefinition {
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

pub fn function_definitions() -> Vec<FunctionDefinition> {
    FunctionKind::ALL.into_iter().map(definition).collect()
}

pub fn definition(kind: FunctionKind) -> FunctionDefinition {
    let parameters = match kind {
        FunctionKind::FindHealthcareFacilities => parameters_schema::<FindFacilitiesArgs>(),
        FunctionKind::GetFacilityDetails => parameters_schema::<FacilityDetailsArgs>(),
        FunctionKind::SearchFacilitiesByService => parameters_schema::<ServiceSearchArgs>(),
        FunctionKind::GetPatientHealthData => parameters_schema::<PatientDataArgs>(),
        FunctionKind::ScheduleAppointment => parameters_schema::<ScheduleAppointmentArgs>(),
    };

    FunctionDefinition {
        name: kind.name().to_string(),
        description: description(kind).to_string(),
        parameters,
    }
}

pub fn description(kind: FunctionKind) -> &'static str {
    match kind {
        FunctionKind::FindHealthcareFacilities => {
            "Find healthcare facilities near a location or matching specific criteria"
        }
        FunctionKind::GetFacilityDetails => {
            "Get detailed information about a specific healthcare facility"
        }
        FunctionKind::SearchFacilitiesByService => {
            "Search for facilities offering a specific healthcare service"
        }
        FunctionKind::GetPatientHealthData => {
            "Retrieve patient health records and information (requires authentication)"
        }
        FunctionKind::ScheduleAppointment => "Schedule a healthcare appointment at a facility",
    }
}

/// Object schema derived from an argument type, without the document-level keys.
fn parameters_schema<T: JsonSchema>() -> Value {
    let mut schema = Value::from(schemars::schema_for!(T));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FacilityType;

    #[test]
    fn catalog_covers_every_function_kind_once() {
        let names: Vec<String> = function_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), FunctionKind::ALL.len());
        for kind in FunctionKind::ALL {
            assert_eq!(names.iter().filter(|n| *n == kind.name()).count(), 1);
        }
    }

    #[test]
    fn required_arguments_come_from_the_argument_types() {
        assert_eq!(definition(FunctionKind::FindHealthcareFacilities).required(), vec!["location"]);
        let binding = definition(FunctionKind::ScheduleAppointment);
        let mut required = binding.required();
        required.sort_unstable();
        assert_eq!(required, vec!["date", "facility_id", "service_type"]);
        assert_eq!(definition(FunctionKind::GetPatientHealthData).required(), vec!["patient_id"]);
    }

    #[test]
    fn schemas_carry_descriptions_and_enums() {
        let def = definition(FunctionKind::FindHealthcareFacilities);
        assert_eq!(def.parameters["type"], "object");
        assert!(def.parameters.get("$schema").is_none());
        let facility_type = &def.parameters["properties"]["facility_type"];
        assert_eq!(facility_type["enum"].as_array().unwrap().len(), FacilityType::ALL.len());
        assert!(facility_type["description"].as_str().unwrap().contains("hospital"));

        let patient = definition(FunctionKind::GetPatientHealthData);
        assert_eq!(
            patient.parameters["properties"]["data_type"]["enum"].as_array().unwrap().len(),
            PATIENT_DATA_TYPES.len()
        );
    }
}
