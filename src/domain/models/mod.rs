use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{geo::Coordinates, DomainError};

pub mod attribute;
pub mod function;

pub use attribute::{AttributeType, AttributeValue};
pub use function::FunctionKind;

/// Attribute key under which scheduled appointments are kept.
pub const APPOINTMENTS_ATTRIBUTE: &str = "appointments";

/// Conventional facility types. The stored type stays an open string.
pub struct FacilityType;

impl FacilityType {
    pub const HOSPITAL: &'static str = "hospital";
    pub const CLINIC: &'static str = "clinic";
    pub const PHARMACY: &'static str = "pharmacy";
    pub const URGENT_CARE: &'static str = "urgent_care";
    pub const SPECIALIST: &'static str = "specialist";
    pub const EMERGENCY_ROOM: &'static str = "emergency_room";

    pub const ALL: [&'static str; 6] = [
        Self::HOSPITAL,
        Self::CLINIC,
        Self::PHARMACY,
        Self::URGENT_CARE,
        Self::SPECIALIST,
        Self::EMERGENCY_ROOM,
    ];
}

/// Core facility row as persisted, without services or attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub facility_type: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub rating: Option<f64>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Facility {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Everything needed to write (or fully replace) one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityDraft {
    pub id: String,
    pub name: String,
    pub facility_type: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl FacilityDraft {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        facility_type: impl Into<String>,
        address: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            facility_type: facility_type.into(),
            address: address.into(),
            latitude,
            longitude,
            rating: None,
            phone: None,
            services: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_services(mut self, services: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_facility_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("facility name is required"));
        }
        if self.facility_type.trim().is_empty() {
            return Err(DomainError::validation("facility type is required"));
        }
        if !Coordinates::new(self.latitude, self.longitude).is_valid() {
            return Err(DomainError::validation(format!(
                "coordinates ({}, {}) are outside latitude [-90, 90] / longitude [-180, 180]",
                self.latitude, self.longitude
            )));
        }
        if let Some(rating) = self.rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(DomainError::validation(format!(
                    "rating {rating} is outside [0, 5]"
                )));
            }
        }
        if let Some(key) = self.attributes.keys().find(|key| key.is_empty() || key.contains('\0')) {
            return Err(DomainError::validation(format!(
                "attribute key {key:?} is not allowed"
            )));
        }
        Ok(())
    }

    /// Services with blanks dropped and duplicates collapsed, sorted.
    pub fn normalized_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|service| !service.trim().is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn into_facility(self, now: DateTime<Utc>) -> Facility {
        Facility {
            id: self.id,
            name: self.name,
            facility_type: self.facility_type,
            address: self.address,
            latitude: self.latitude,
            longitude: self.longitude,
            rating: self.rating,
            phone: self.phone,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn validate_facility_id(id: &str) -> Result<(), DomainError> {
    if id.trim().is_empty() {
        return Err(DomainError::validation("facility id is required"));
    }
    if id.contains('\0') {
        return Err(DomainError::validation("facility id cannot contain NUL bytes"));
    }
    Ok(())
}

/// Denormalised facility view: core row, sorted services and decoded attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    #[serde(flatten)]
    pub facility: Facility,
    pub services: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl FacilityRecord {
    pub fn id(&self) -> &str {
        &self.facility.id
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Optional, conjunctive search predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub facility_type: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub origin: Option<Coordinates>,
    #[serde(default)]
    pub max_distance_miles: Option<f64>,
}

impl SearchCriteria {
    pub fn with_type(mut self, facility_type: impl Into<String>) -> Self {
        self.facility_type = Some(facility_type.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn near(mut self, origin: Coordinates, max_distance_miles: Option<f64>) -> Self {
        self.origin = Some(origin);
        self.max_distance_miles = max_distance_miles;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(origin) = &self.origin {
            if !origin.is_valid() {
                return Err(DomainError::validation(format!(
                    "search origin ({}, {}) is not a valid coordinate",
                    origin.lat, origin.lon
                )));
            }
        }
        if let Some(radius) = self.max_distance_miles {
            if !radius.is_finite() || radius < 0.0 {
                return Err(DomainError::validation(format!(
                    "search radius {radius} must be a non-negative number of miles"
                )));
            }
        }
        if let Some(rating) = self.min_rating {
            if !rating.is_finite() {
                return Err(DomainError::validation("minimum rating must be a number"));
            }
        }
        Ok(())
    }

    /// Non-geographic predicates. Distance is handled by the search engine.
    pub fn matches(&self, record: &FacilityRecord) -> bool {
        if let Some(facility_type) = &self.facility_type {
            if &record.facility.facility_type != facility_type {
                return false;
            }
        }
        if let Some(service) = &self.service {
            if !record.services.iter().any(|s| s.contains(service.as_str())) {
                return false;
            }
        }
        if let Some(min_rating) = self.min_rating {
            match record.facility.rating {
                Some(rating) if rating >= min_rating => {}
                _ => return false,
            }
        }
        self.attributes.iter().all(|(key, target)| {
            record
                .attribute(key)
                .is_some_and(|value| value.to_stored_text().contains(&filter_text(target)))
        })
    }
}

fn filter_text(target: &Value) -> String {
    match target {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// A search hit with the distance from the search origin, when one was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityMatch {
    #[serde(flatten)]
    pub record: FacilityRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
}

/// Appointment entry kept inside the `appointments` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: String,
    pub service_type: String,
    pub date: String,
    pub patient_id: Option<String>,
    pub status: String,
}
