use serde_json::json;
use tracing::info;

use crate::{
    application::services::FacilityStore,
    domain::{AttributeValue, DomainError, FacilityDraft, FacilityType},
};

/// Demo facilities written into an empty store.
pub fn sample_facilities() -> Vec<FacilityDraft> {
    vec![
        FacilityDraft::new(
            "hosp_001",
            "City General Hospital",
            FacilityType::HOSPITAL,
            "123 Main St, City, State 12345",
            40.7128,
            -74.0060,
        )
        .with_services(["emergency", "surgery", "cardiology", "pediatrics", "mri", "xray"])
        .with_rating(4.5)
        .with_phone("(555) 123-4567")
        .with_attribute("bed_count", 250_i64)
        .with_attribute("emergency_room", true)
        .with_attribute(
            "accepts_insurance",
            AttributeValue::Json(json!(["Medicare", "Medicaid", "Blue Cross"])),
        )
        .with_attribute("parking_available", true)
        .with_attribute("visiting_hours", "24/7"),
        FacilityDraft::new(
            "clinic_001",
            "Downtown Health Clinic",
            FacilityType::CLINIC,
            "456 Oak Ave, City, State 12345",
            40.7589,
            -73.9851,
        )
        .with_services(["primary_care", "vaccination", "lab_tests", "mental_health"])
        .with_rating(4.2)
        .with_phone("(555) 234-5678")
        .with_attribute("accepts_walk_ins", true)
        .with_attribute(
            "languages_spoken",
            AttributeValue::Json(json!(["English", "Spanish", "French"])),
        )
        .with_attribute("wheelchair_accessible", true)
        .with_attribute("parking_available", false),
        FacilityDraft::new(
            "pharm_001",
            "Central Pharmacy",
            FacilityType::PHARMACY,
            "789 Elm St, City, State 12345",
            40.7489,
            -73.9680,
        )
        .with_services(["prescription", "vaccination", "flu_shot"])
        .with_rating(4.0)
        .with_phone("(555) 345-6789")
        .with_attribute("drive_through", true)
        .with_attribute("open_24_hours", false)
        .with_attribute("delivery_available", true),
        FacilityDraft::new(
            "urgent_001",
            "Express Urgent Care",
            FacilityType::URGENT_CARE,
            "321 Pine Rd, City, State 12345",
            40.7280,
            -73.9942,
        )
        .with_services(["urgent_care", "xray", "lab_tests", "sutures"])
        .with_rating(4.3)
        .with_phone("(555) 456-7890")
        .with_attribute("average_wait_time_minutes", 25_i64)
        .with_attribute("accepts_walk_ins", true)
        .with_attribute("xray_on_site", true),
    ]
}

/// Writes the sample facilities when the store holds none. Returns how many
/// facilities were written.
pub fn seed_if_empty(store: &dyn FacilityStore) -> Result<usize, DomainError> {
    let existing = store.list_ids()?;
    if !existing.is_empty() {
        info!(
            target: "carenav::store",
            existing = existing.len(),
            "store already populated, skipping sample data"
        );
        return Ok(0);
    }

    let drafts = sample_facilities();
    for draft in &drafts {
        store.add_facility(draft)?;
    }
    info!(target: "carenav::store", seeded = drafts.len(), "sample facilities written");
    Ok(drafts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::MemoryStore;

    #[test]
    fn seeds_only_an_empty_store() {
        let store = MemoryStore::default();
        assert_eq!(seed_if_empty(&store).unwrap(), 4);
        assert_eq!(seed_if_empty(&store).unwrap(), 0);
        assert_eq!(
            store.list_ids().unwrap(),
            vec!["clinic_001", "hosp_001", "pharm_001", "urgent_001"]
        );
    }

    #[test]
    fn sample_drafts_are_valid() {
        for draft in sample_facilities() {
            draft.validate().unwrap();
        }
    }
}
