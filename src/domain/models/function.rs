use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// The closed set of operations reachable through the function dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    FindHealthcareFacilities,
    GetFacilityDetails,
    SearchFacilitiesByService,
    GetPatientHealthData,
    ScheduleAppointment,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 5] = [
        FunctionKind::FindHealthcareFacilities,
        FunctionKind::GetFacilityDetails,
        FunctionKind::SearchFacilitiesByService,
        FunctionKind::GetPatientHealthData,
        FunctionKind::ScheduleAppointment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::FindHealthcareFacilities => "find_healthcare_facilities",
            FunctionKind::GetFacilityDetails => "get_facility_details",
            FunctionKind::SearchFacilitiesByService => "search_facilities_by_service",
            FunctionKind::GetPatientHealthData => "get_patient_health_data",
            FunctionKind::ScheduleAppointment => "schedule_appointment",
        }
    }

    /// Whether the operation writes to the store.
    pub fn is_mutating(&self) -> bool {
        matches!(self, FunctionKind::ScheduleAppointment)
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionKind {
    type Err = DomainError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| DomainError::unknown_operation(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in FunctionKind::ALL {
            assert_eq!(kind.name().parse::<FunctionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = "unsupported_op".parse::<FunctionKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown function: unsupported_op");
    }

    #[test]
    fn serde_names_match_wire_names() {
        let encoded = serde_json::to_value(FunctionKind::ScheduleAppointment).unwrap();
        assert_eq!(encoded, serde_json::json!("schedule_appointment"));
    }
}
