use std::collections::BTreeMap;
use std::path::Path;

use bincode::Options;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::{
    transaction::{TransactionError, TransactionResult},
    Config, Db, IVec, Transactional, Tree,
};
use tracing::{debug, info, warn};

use crate::{
    application::services::{store::AttributeUpdate, FacilityStore},
    domain::{
        models::validate_facility_id, AttributeType, AttributeValue, DomainError, Facility,
        FacilityDraft, FacilityRecord,
    },
};

const FACILITIES_TREE: &str = "facilities";
const SERVICES_TREE: &str = "facility_services";
const ATTRIBUTES_TREE: &str = "facility_attributes";

/// Attribute body and its type tag as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAttribute {
    value: String,
    attribute_type: String,
}

/// Facility store backed by three `sled` trees.
///
/// `facilities` maps an id to its core row. `facility_services` and
/// `facility_attributes` are keyed by `id \0 name`, so a facility's children
/// are one prefix scan away. Writers take the gate exclusively and apply all
/// three trees in a single transaction; readers share the gate.
pub struct SledFacilityStore {
    db: Db,
    facilities: Tree,
    services: Tree,
    attributes: Tree,
    gate: RwLock<()>,
}

impl SledFacilityStore {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|err| {
            DomainError::storage(format!("failed to create data directory {:?}: {err}", dir))
        })?;

        let db = Config::default()
            .path(dir)
            .cache_capacity(16 * 1024 * 1024)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))?;

        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|err| DomainError::storage(format!("failed to open {name} tree: {err}")))
        };
        let facilities = open_tree(FACILITIES_TREE)?;
        let services = open_tree(SERVICES_TREE)?;
        let attributes = open_tree(ATTRIBUTES_TREE)?;

        info!(target: "carenav::store", path = %dir.display(), "facility store opened");

        Ok(Self {
            db,
            facilities,
            services,
            attributes,
            gate: RwLock::new(()),
        })
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::storage(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| DomainError::storage(format!("deserialization error: {err}")))
    }

    fn child_prefix(id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(id.len() + 1);
        prefix.extend_from_slice(id.as_bytes());
        prefix.push(0);
        prefix
    }

    fn child_key(id: &str, name: &str) -> Vec<u8> {
        let mut key = Self::child_prefix(id);
        key.extend_from_slice(name.as_bytes());
        key
    }

    fn child_name(key: &IVec, prefix_len: usize) -> Result<String, DomainError> {
        String::from_utf8(key[prefix_len..].to_vec())
            .map_err(|err| DomainError::storage(format!("child key is not utf-8: {err}")))
    }

    fn child_keys(tree: &Tree, id: &str) -> Result<Vec<IVec>, DomainError> {
        tree.scan_prefix(Self::child_prefix(id))
            .keys()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DomainError::storage(format!("failed to scan children of {id}: {err}")))
    }

    fn read_facility(&self, id: &str) -> Result<Option<Facility>, DomainError> {
        self.facilities
            .get(id.as_bytes())
            .map_err(|err| DomainError::storage(format!("failed to read facility {id}: {err}")))?
            .map(|bytes| Self::deserialize(&bytes))
            .transpose()
    }

    fn read_attribute(&self, id: &str, key: &str) -> Result<Option<AttributeValue>, DomainError> {
        self.attributes
            .get(Self::child_key(id, key))
            .map_err(|err| DomainError::storage(format!("failed to read attribute {key}: {err}")))?
            .map(|bytes| Self::decode_attribute(&bytes))
            .transpose()
    }

    fn encode_attribute(value: &AttributeValue) -> Result<Vec<u8>, DomainError> {
        let (body, tag) = value.encode();
        Self::serialize(&StoredAttribute {
            value: body,
            attribute_type: tag.as_str().to_string(),
        })
    }

    fn decode_attribute(bytes: &[u8]) -> Result<AttributeValue, DomainError> {
        let stored: StoredAttribute = Self::deserialize(bytes)?;
        AttributeValue::decode(&stored.value, AttributeType::from_tag(&stored.attribute_type))
    }

    /// Assembles the denormalised view of one facility. Callers hold the gate.
    fn assemble(&self, facility: Facility) -> Result<FacilityRecord, DomainError> {
        let prefix = Self::child_prefix(&facility.id);

        let mut services = Vec::new();
        for entry in self.services.scan_prefix(&prefix).keys() {
            let key = entry.map_err(|err| {
                DomainError::storage(format!("failed to read services of {}: {err}", facility.id))
            })?;
            services.push(Self::child_name(&key, prefix.len())?);
        }

        let mut attributes = BTreeMap::new();
        for entry in self.attributes.scan_prefix(&prefix) {
            let (key, value) = entry.map_err(|err| {
                DomainError::storage(format!("failed to read attributes of {}: {err}", facility.id))
            })?;
            let name = Self::child_name(&key, prefix.len())?;
            let value = Self::decode_attribute(&value).map_err(|err| match err {
                DomainError::Codec(msg) => {
                    DomainError::codec(format!("{}.{name}: {msg}", facility.id))
                }
                other => other,
            })?;
            attributes.insert(name, value);
        }

        Ok(FacilityRecord {
            facility,
            services,
            attributes,
        })
    }

    fn flush(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|err| DomainError::storage(format!("failed to flush db: {err}")))
    }

    fn log_failure(op: &'static str, facility_id: &str, err: &DomainError) {
        warn!(target: "carenav::store", op, facility_id, error = %err, "store operation failed");
    }
}

fn transaction_error(op: &str, err: TransactionError<DomainError>) -> DomainError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => {
            DomainError::storage(format!("{op} transaction failed: {err}"))
        }
    }
}

fn validate_attribute_key(key: &str) -> Result<(), DomainError> {
    if key.is_empty() || key.contains('\0') {
        return Err(DomainError::validation(format!(
            "attribute key {key:?} is not allowed"
        )));
    }
    Ok(())
}

impl FacilityStore for SledFacilityStore {
    fn add_facility(&self, draft: &FacilityDraft) -> Result<(), DomainError> {
        let result = (|| -> Result<(), DomainError> {
            draft.validate()?;

            let id = draft.id.as_str();
            let row = Self::serialize(&draft.clone().into_facility(Utc::now()))?;
            let services: Vec<Vec<u8>> = draft
                .normalized_services()
                .iter()
                .map(|service| Self::child_key(id, service))
                .collect();
            let attributes = draft
                .attributes
                .iter()
                .map(|(key, value)| Ok((Self::child_key(id, key), Self::encode_attribute(value)?)))
                .collect::<Result<Vec<_>, DomainError>>()?;

            let _guard = self.gate.write();
            let stale_services = Self::child_keys(&self.services, id)?;
            let stale_attributes = Self::child_keys(&self.attributes, id)?;

            let outcome: TransactionResult<(), DomainError> =
                (&self.facilities, &self.services, &self.attributes).transaction(
                    |(facilities, service_tree, attribute_tree)| {
                        facilities.insert(id.as_bytes(), row.as_slice())?;
                        for key in &stale_services {
                            service_tree.remove(key)?;
                        }
                        for key in &stale_attributes {
                            attribute_tree.remove(key)?;
                        }
                        for key in &services {
                            service_tree.insert(key.as_slice(), &[] as &[u8])?;
                        }
                        for (key, value) in &attributes {
                            attribute_tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        Ok(())
                    },
                );
            outcome.map_err(|err| transaction_error("add_facility", err))?;
            self.flush()?;

            info!(
                target: "carenav::store",
                op = "add_facility",
                facility_id = id,
                services = services.len(),
                attributes = attributes.len(),
                "facility written"
            );
            Ok(())
        })();

        result.inspect_err(|err| Self::log_failure("add_facility", &draft.id, err))
    }

    fn get_facility(&self, id: &str) -> Result<Option<FacilityRecord>, DomainError> {
        let _guard = self.gate.read();
        self.read_facility(id)?
            .map(|facility| self.assemble(facility))
            .transpose()
            .inspect_err(|err| Self::log_failure("get_facility", id, err))
    }

    fn modify_attribute(
        &self,
        id: &str,
        key: &str,
        update: &mut AttributeUpdate<'_>,
    ) -> Result<AttributeValue, DomainError> {
        let result = (|| -> Result<AttributeValue, DomainError> {
            validate_facility_id(id)?;
            validate_attribute_key(key)?;

            let _guard = self.gate.write();
            let mut facility = self
                .read_facility(id)?
                .ok_or_else(|| DomainError::not_found(format!("Facility {id} not found")))?;

            let value = update(self.read_attribute(id, key)?)?;
            let encoded = Self::encode_attribute(&value)?;
            facility.updated_at = Utc::now();
            let row = Self::serialize(&facility)?;
            let attribute_key = Self::child_key(id, key);

            let outcome: TransactionResult<(), DomainError> = (&self.facilities, &self.attributes)
                .transaction(|(facilities, attribute_tree)| {
                    attribute_tree.insert(attribute_key.as_slice(), encoded.as_slice())?;
                    facilities.insert(id.as_bytes(), row.as_slice())?;
                    Ok(())
                });
            outcome.map_err(|err| transaction_error("modify_attribute", err))?;
            self.flush()?;

            debug!(
                target: "carenav::store",
                op = "modify_attribute",
                facility_id = id,
                attribute = key,
                attribute_type = %value.kind(),
                "attribute written"
            );
            Ok(value)
        })();

        result.inspect_err(|err| Self::log_failure("modify_attribute", id, err))
    }

    fn delete_facility(&self, id: &str) -> Result<bool, DomainError> {
        let result = (|| -> Result<bool, DomainError> {
            validate_facility_id(id)?;

            let _guard = self.gate.write();
            if self.read_facility(id)?.is_none() {
                return Ok(false);
            }
            let services = Self::child_keys(&self.services, id)?;
            let attributes = Self::child_keys(&self.attributes, id)?;

            let outcome: TransactionResult<(), DomainError> =
                (&self.facilities, &self.services, &self.attributes).transaction(
                    |(facilities, service_tree, attribute_tree)| {
                        facilities.remove(id.as_bytes())?;
                        for key in &services {
                            service_tree.remove(key)?;
                        }
                        for key in &attributes {
                            attribute_tree.remove(key)?;
                        }
                        Ok(())
                    },
                );
            outcome.map_err(|err| transaction_error("delete_facility", err))?;
            self.flush()?;

            info!(target: "carenav::store", op = "delete_facility", facility_id = id, "facility deleted");
            Ok(true)
        })();

        result.inspect_err(|err| Self::log_failure("delete_facility", id, err))
    }

    fn list_ids(&self) -> Result<Vec<String>, DomainError> {
        let _guard = self.gate.read();
        self.facilities
            .iter()
            .keys()
            .map(|key| {
                let key = key
                    .map_err(|err| DomainError::storage(format!("failed to list facilities: {err}")))?;
                String::from_utf8(key.to_vec())
                    .map_err(|err| DomainError::storage(format!("facility id is not utf-8: {err}")))
            })
            .collect()
    }

    fn snapshot(&self) -> Result<Vec<FacilityRecord>, DomainError> {
        let _guard = self.gate.read();
        let mut records = Vec::new();
        for entry in self.facilities.iter().values() {
            let bytes = entry
                .map_err(|err| DomainError::storage(format!("failed to read facility row: {err}")))?;
            let facility: Facility = Self::deserialize(&bytes)?;
            records.push(self.assemble(facility)?);
        }
        Ok(records)
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.flush()
    }
}
