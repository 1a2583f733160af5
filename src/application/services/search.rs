use std::sync::Arc;

use tracing::debug;

use crate::{
    application::services::FacilityStore,
    domain::{DomainError, FacilityMatch, SearchCriteria},
};

/// Composes search predicates over a consistent view of the facility store.
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn FacilityStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn FacilityStore>) -> Self {
        Self { store }
    }

    /// Returns facilities satisfying every supplied predicate.
    ///
    /// With an origin, each hit carries its distance in miles, hits beyond
    /// `max_distance_miles` are dropped and the list is sorted nearest first.
    /// Without one, results keep store order.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<FacilityMatch>, DomainError> {
        criteria.validate()?;

        let records = self.store.snapshot()?;
        let scanned = records.len();

        let mut matches: Vec<FacilityMatch> = records
            .into_iter()
            .filter(|record| criteria.matches(record))
            .filter_map(|record| {
                let distance_miles = criteria
                    .origin
                    .map(|origin| origin.distance_to(&record.facility.coordinates()));

                if let (Some(distance), Some(limit)) = (distance_miles, criteria.max_distance_miles) {
                    if distance > limit {
                        return None;
                    }
                }

                Some(FacilityMatch {
                    record,
                    distance_miles,
                })
            })
            .collect();

        if criteria.origin.is_some() {
            matches.sort_by(|a, b| {
                let a = a.distance_miles.unwrap_or(f64::INFINITY);
                let b = b.distance_miles.unwrap_or(f64::INFINITY);
                a.total_cmp(&b)
            });
        }

        debug!(
            target: "carenav::search",
            scanned,
            matched = matches.len(),
            "facility search finished"
        );

        Ok(matches)
    }
}
