//! In-memory doubles shared by the service-layer tests.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::{
    application::{
        dtos::FunctionCallRequest,
        services::{
            store::AttributeUpdate, FacilityStore, FunctionClassifier, FunctionDefinition,
        },
    },
    domain::{AttributeValue, DomainError, FacilityDraft, FacilityRecord},
};

/// Map-backed store; iteration order matches the sled store (by id).
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, FacilityRecord>>,
}

impl FacilityStore for MemoryStore {
    fn add_facility(&self, draft: &FacilityDraft) -> Result<(), DomainError> {
        draft.validate()?;
        let record = FacilityRecord {
            services: draft.normalized_services(),
            attributes: draft.attributes.clone(),
            facility: draft.clone().into_facility(Utc::now()),
        };
        self.records.write().insert(draft.id.clone(), record);
        Ok(())
    }

    fn get_facility(&self, id: &str) -> Result<Option<FacilityRecord>, DomainError> {
        Ok(self.records.read().get(id).cloned())
    }

    fn modify_attribute(
        &self,
        id: &str,
        key: &str,
        update: &mut AttributeUpdate<'_>,
    ) -> Result<AttributeValue, DomainError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("Facility {id} not found")))?;
        let value = update(record.attributes.get(key).cloned())?;
        record.attributes.insert(key.to_string(), value.clone());
        record.facility.updated_at = Utc::now();
        Ok(value)
    }

    fn delete_facility(&self, id: &str) -> Result<bool, DomainError> {
        Ok(self.records.write().remove(id).is_some())
    }

    fn list_ids(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn snapshot(&self) -> Result<Vec<FacilityRecord>, DomainError> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Classifier that replays a fixed answer and records the prompts it saw.
pub struct StubClassifier {
    answer: Option<FunctionCallRequest>,
    pub prompts: Mutex<Vec<String>>,
}

impl StubClassifier {
    pub fn answering(name: &str, arguments: Value) -> Self {
        Self {
            answer: Some(FunctionCallRequest::new(name, arguments)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl FunctionClassifier for StubClassifier {
    fn classify(
        &self,
        prompt: &str,
        _functions: &[FunctionDefinition],
    ) -> Result<FunctionCallRequest, DomainError> {
        self.prompts.lock().push(prompt.to_string());
        self.answer
            .clone()
            .ok_or_else(|| DomainError::other("classifier unavailable"))
    }
}
