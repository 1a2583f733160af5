use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    application::{
        dtos::{
            FunctionCallRequest, HealthStatusResponse, MapFacility, QueryOutcome, Recommendation,
            TriageRequest, TriageResponse,
        },
        services::{
            catalog::{function_definitions, FunctionDefinition},
            FacilityStore, FunctionDispatcher,
        },
    },
    domain::{Coordinates, DomainError, FacilityMatch, FacilityType, SearchCriteria},
};

const MAX_RECOMMENDATIONS: usize = 5;
const RECOMMENDATION_TAGS: usize = 4;
const MAP_TAGS: usize = 3;

/// Turns free text into a `{name, arguments}` call over the given functions.
pub trait FunctionClassifier: Send + Sync {
    fn classify(
        &self,
        prompt: &str,
        functions: &[FunctionDefinition],
    ) -> Result<FunctionCallRequest, DomainError>;
}

/// Classifier used when no remote model is configured.
pub struct DisabledClassifier;

impl FunctionClassifier for DisabledClassifier {
    fn classify(
        &self,
        _prompt: &str,
        _functions: &[FunctionDefinition],
    ) -> Result<FunctionCallRequest, DomainError> {
        Err(DomainError::other("function classifier is disabled"))
    }
}

/// User-facing workflows layered over the dispatcher and the store.
pub struct NavigatorService {
    store: Arc<dyn FacilityStore>,
    dispatcher: Arc<FunctionDispatcher>,
    classifier: Arc<dyn FunctionClassifier>,
}

impl NavigatorService {
    pub fn new(
        store: Arc<dyn FacilityStore>,
        dispatcher: Arc<FunctionDispatcher>,
        classifier: Arc<dyn FunctionClassifier>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            classifier,
        }
    }

    pub fn dispatcher(&self) -> &FunctionDispatcher {
        &self.dispatcher
    }

    /// Classifies `query`, runs the resulting function and wraps the outcome.
    pub fn process_query(&self, query: &str) -> QueryOutcome {
        let call = match self.classifier.classify(query, &function_definitions()) {
            Ok(call) => call,
            Err(err) => {
                warn!(target: "carenav::classifier", error = %err, "query classification failed");
                return QueryOutcome {
                    success: false,
                    query: query.to_string(),
                    function_name: None,
                    arguments: None,
                    result: None,
                    error: Some(format!("Failed to generate function call: {err}")),
                    timestamp: None,
                };
            }
        };

        info!(
            target: "carenav::dispatch",
            function = %call.name,
            "running classified function call"
        );
        let result = self.dispatcher.dispatch(&call.name, call.arguments.clone());

        QueryOutcome {
            success: true,
            query: query.to_string(),
            function_name: Some(call.name),
            arguments: Some(call.arguments),
            result: Some(result),
            error: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Recommends nearby facilities for an emergency description.
    pub fn triage(&self, request: &TriageRequest) -> Result<TriageResponse, DomainError> {
        let severity = request.severity.trim().to_lowercase();
        let critical = severity == "critical";

        let mut hints = match self.classifier.classify(&request.message, &function_definitions()) {
            Ok(call) => TriageHints::from_arguments(&call.arguments),
            Err(err) => {
                debug!(target: "carenav::classifier", error = %err, "falling back to keyword triage");
                TriageHints::default()
            }
        };
        if hints.service.is_none() {
            hints.apply_keywords(&request.message);
        }

        let message = triage_message(
            hints.condition.as_deref().unwrap_or(&request.message),
            &severity,
        );

        let mut criteria = SearchCriteria {
            facility_type: Some(
                hints
                    .facility_type
                    .unwrap_or_else(|| FacilityType::HOSPITAL.to_string()),
            ),
            // Stored service names are lower-case.
            service: hints.service.map(|service| service.to_lowercase()),
            ..SearchCriteria::default()
        };
        if let (Some(lat), Some(lon)) = (request.latitude, request.longitude) {
            let radius = if critical { 20.0 } else { 30.0 };
            criteria = criteria.near(Coordinates::new(lat, lon), Some(radius));
        }

        let recommendations: Vec<Recommendation> = self
            .dispatcher
            .search_engine()
            .search(&criteria)?
            .into_iter()
            .take(MAX_RECOMMENDATIONS)
            .map(|hit| recommendation(hit, critical))
            .collect();

        info!(
            target: "carenav::dispatch",
            severity = %severity,
            recommendations = recommendations.len(),
            "triage answered"
        );

        Ok(TriageResponse {
            message,
            recommendations,
        })
    }

    /// Every facility as a map marker, in id order.
    pub fn map_facilities(&self) -> Result<Vec<MapFacility>, DomainError> {
        Ok(self
            .store
            .snapshot()?
            .into_iter()
            .map(|record| MapFacility {
                tags: record.services.iter().take(MAP_TAGS).cloned().collect(),
                id: record.facility.id,
                name: record.facility.name,
                lat: record.facility.latitude,
                lng: record.facility.longitude,
                facility_type: record.facility.facility_type,
                rating: record.facility.rating,
                phone: record.facility.phone,
            })
            .collect())
    }

    pub fn search_by_attribute(
        &self,
        key: &str,
        value: Value,
        facility_type: Option<&str>,
    ) -> Result<Vec<FacilityMatch>, DomainError> {
        let mut criteria = SearchCriteria::default().with_attribute(key, value);
        if let Some(facility_type) = facility_type {
            criteria = criteria.with_type(facility_type);
        }
        self.dispatcher.search_engine().search(&criteria)
    }

    pub fn health(&self) -> HealthStatusResponse {
        match self.store.ping() {
            Ok(()) => HealthStatusResponse {
                ok: true,
                message: "facility store reachable".into(),
                details: None,
            },
            Err(err) => HealthStatusResponse {
                ok: false,
                message: "facility store unavailable".into(),
                details: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Default)]
struct TriageHints {
    service: Option<String>,
    condition: Option<String>,
    facility_type: Option<String>,
}

impl TriageHints {
    fn from_arguments(arguments: &Value) -> Self {
        let text = |key: &str| {
            arguments
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let condition = text("condition");
        Self {
            service: text("service").or_else(|| condition.clone()),
            condition,
            facility_type: text("facility_type"),
        }
    }

    fn apply_keywords(&mut self, message: &str) {
        let lower = message.to_lowercase();
        let (service, condition) = if ["cardiac", "heart"].iter().any(|word| lower.contains(word)) {
            ("Cardiology", "cardiac")
        } else if lower.contains("stroke") {
            ("Stroke Center", "stroke")
        } else if lower.contains("trauma") {
            ("Trauma", "trauma")
        } else {
            return;
        };
        self.service = Some(service.to_string());
        self.condition = Some(condition.to_string());
    }
}

fn recommendation(hit: FacilityMatch, critical: bool) -> Recommendation {
    let distance = hit.distance_miles.filter(|miles| *miles > 0.0);
    let facility = hit.record.facility;
    Recommendation {
        eta: estimate_eta(distance.unwrap_or(0.0), critical),
        tags: hit
            .record
            .services
            .into_iter()
            .take(RECOMMENDATION_TAGS)
            .collect(),
        id: facility.id,
        name: facility.name,
        lat: facility.latitude,
        lng: facility.longitude,
        distance: distance.map(|miles| (miles * 10.0).round() / 10.0),
        rating: facility.rating,
        phone: facility.phone,
    }
}

fn triage_message(condition: &str, severity: &str) -> String {
    let condition = condition.to_lowercase();
    let priority = severity.to_uppercase();
    if condition.contains("cardiac") || condition.contains("heart") {
        format!("Detected possible cardiac emergency ({priority} priority). Recommending cardiac-capable hospitals with ICU and 24/7 emergency services.")
    } else if condition.contains("stroke") {
        format!("Suspected stroke ({priority} priority). Prioritizing stroke-certified facilities with neurology departments and CT scan availability.")
    } else if condition.contains("trauma") {
        format!("Trauma incident detected ({priority} priority). Showing nearest Level I trauma centers with helicopter access and trauma teams.")
    } else {
        format!("Medical condition noted ({priority} priority). Displaying nearby hospitals and emergency facilities.")
    }
}

/// Drive time at 40 mph for critical cases, 30 mph otherwise.
pub fn estimate_eta(distance_miles: f64, critical: bool) -> String {
    if distance_miles.is_nan() || distance_miles <= 0.0 {
        return "Unknown".into();
    }
    let speed = if critical { 40.0 } else { 30.0 };
    let minutes = (distance_miles / speed * 60.0) as u64;
    match minutes {
        0 => "<1 min".into(),
        1..=59 => format!("{minutes} min"),
        _ if minutes % 60 == 0 => format!("{}h", minutes / 60),
        _ => format!("{}h {}m", minutes / 60, minutes % 60),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::services::{
        sample_data, test_support::{MemoryStore, StubClassifier}, DispatchConfig,
    };

    fn navigator(classifier: StubClassifier) -> (NavigatorService, Arc<StubClassifier>) {
        let store: Arc<dyn FacilityStore> = Arc::new(MemoryStore::default());
        sample_data::seed_if_empty(store.as_ref()).unwrap();
        let dispatcher = Arc::new(FunctionDispatcher::new(
            Arc::clone(&store),
            DispatchConfig::default(),
        ));
        let classifier = Arc::new(classifier);
        (
            NavigatorService::new(store, dispatcher, classifier.clone()),
            classifier,
        )
    }

    #[test]
    fn query_runs_the_classified_function() {
        let (navigator, classifier) = navigator(StubClassifier::answering(
            "get_facility_details",
            json!({"facility_id": "hosp_001"}),
        ));
        let outcome = navigator.process_query("Get details about facility hosp_001");
        assert!(outcome.success);
        assert_eq!(outcome.function_name.as_deref(), Some("get_facility_details"));
        assert_eq!(outcome.result.unwrap()["name"], "City General Hospital");
        assert!(outcome.timestamp.is_some());
        assert_eq!(
            classifier.prompts.lock().as_slice(),
            ["Get details about facility hosp_001"]
        );
    }

    #[test]
    fn classifier_failure_is_an_unsuccessful_outcome() {
        let (navigator, _) = navigator(StubClassifier::failing());
        let outcome = navigator.process_query("find me a clinic");
        assert!(!outcome.success);
        assert_eq!(outcome.query, "find me a clinic");
        assert!(outcome.error.unwrap().starts_with("Failed to generate function call"));
        assert!(outcome.result.is_none());
    }

    #[test]
    fn classified_unknown_function_still_returns_an_envelope() {
        let (navigator, _) = navigator(StubClassifier::answering("book_taxi", json!({})));
        let outcome = navigator.process_query("get me a cab");
        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap()["error"], "Unknown function: book_taxi");
    }

    #[test]
    fn keyword_fallback_finds_cardiology_hospitals() {
        let (navigator, _) = navigator(StubClassifier::failing());
        let response = navigator
            .triage(&TriageRequest::new("Possible heart attack").at(40.7128, -74.0060))
            .unwrap();
        assert!(response.message.starts_with("Detected possible cardiac emergency (CRITICAL"));
        assert_eq!(response.recommendations.len(), 1);
        let top = &response.recommendations[0];
        assert_eq!(top.id, "hosp_001");
        assert_eq!(top.eta, "Unknown");
        assert_eq!(top.distance, None);
        assert_eq!(top.tags, vec!["cardiology", "emergency", "mri", "pediatrics"]);
    }

    #[test]
    fn classifier_hints_override_the_default_type() {
        let (navigator, _) = navigator(StubClassifier::answering(
            "find_healthcare_facilities",
            json!({"location": "here", "facility_type": "urgent_care", "service": "xray"}),
        ));
        let response = navigator
            .triage(&TriageRequest::new("cut my hand").at(40.7128, -74.0060))
            .unwrap();
        assert!(response.message.starts_with("Medical condition noted"));
        let top = &response.recommendations[0];
        assert_eq!(top.id, "urgent_001");
        assert_eq!(top.distance, Some(1.2));
        assert_eq!(top.eta, "1 min");
    }

    #[test]
    fn severity_controls_the_search_radius() {
        let (navigator, _) = navigator(StubClassifier::failing());
        let far = TriageRequest::new("chest pain").at(41.1, -74.0060);

        let critical = navigator.triage(&far).unwrap();
        assert!(critical.recommendations.is_empty());

        let stable = navigator.triage(&far.with_severity("stable")).unwrap();
        assert!(stable.message.contains("(STABLE priority)"));
        assert_eq!(stable.recommendations.len(), 1);
        assert_eq!(stable.recommendations[0].distance, Some(26.8));
        assert_eq!(stable.recommendations[0].eta, "53 min");
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(estimate_eta(0.0, true), "Unknown");
        assert_eq!(estimate_eta(0.5, true), "<1 min");
        assert_eq!(estimate_eta(10.0, true), "15 min");
        assert_eq!(estimate_eta(40.0, true), "1h");
        assert_eq!(estimate_eta(45.0, false), "1h 30m");
    }

    #[test]
    fn map_listing_keeps_three_tags() {
        let (navigator, _) = navigator(StubClassifier::failing());
        let markers = navigator.map_facilities().unwrap();
        assert_eq!(markers.len(), 4);
        let hospital = markers.iter().find(|m| m.id == "hosp_001").unwrap();
        assert_eq!(hospital.tags, vec!["cardiology", "emergency", "mri"]);
        assert_eq!(hospital.facility_type, "hospital");
    }

    #[test]
    fn attribute_search_with_optional_type() {
        let (navigator, _) = navigator(StubClassifier::failing());
        let walk_ins = navigator
            .search_by_attribute("accepts_walk_ins", json!(true), None)
            .unwrap();
        let ids: Vec<&str> = walk_ins.iter().map(|m| m.record.id()).collect();
        assert_eq!(ids, vec!["clinic_001", "urgent_001"]);

        let clinics = navigator
            .search_by_attribute("accepts_walk_ins", json!(true), Some("clinic"))
            .unwrap();
        assert_eq!(clinics.len(), 1);
    }

    #[test]
    fn health_reports_a_reachable_store() {
        let (navigator, _) = navigator(StubClassifier::failing());
        assert!(navigator.health().ok);
    }
}
