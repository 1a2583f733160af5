use crate::domain::{AttributeValue, DomainError, FacilityDraft, FacilityRecord};

/// Callback used to rewrite one attribute in place.
pub type AttributeUpdate<'a> =
    dyn FnMut(Option<AttributeValue>) -> Result<AttributeValue, DomainError> + 'a;

/// Contract for the facility persistence engine.
///
/// Every write is all-or-nothing: on error the persisted state is left as it
/// was before the call. Readers never observe a write half-applied.
pub trait FacilityStore: Send + Sync {
    /// Inserts the facility or fully replaces an existing one with the same id,
    /// including its services and attributes.
    fn add_facility(&self, draft: &FacilityDraft) -> Result<(), DomainError>;

    fn get_facility(&self, id: &str) -> Result<Option<FacilityRecord>, DomainError>;

    /// Applies `update` to the current value of `key` (if any) and stores the
    /// result, bumping the facility's update timestamp. The read and the write
    /// happen under the same writer lock.
    fn modify_attribute(
        &self,
        id: &str,
        key: &str,
        update: &mut AttributeUpdate<'_>,
    ) -> Result<AttributeValue, DomainError>;

    fn update_attribute(
        &self,
        id: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<(), DomainError> {
        let mut replacement = Some(value);
        self.modify_attribute(id, key, &mut |_current| {
            replacement
                .take()
                .ok_or_else(|| DomainError::other("attribute update invoked twice"))
        })
        .map(|_| ())
    }

    /// Returns `true` when a facility was removed.
    fn delete_facility(&self, id: &str) -> Result<bool, DomainError>;

    fn list_ids(&self) -> Result<Vec<String>, DomainError>;

    /// All facilities, read as one consistent view, in ascending id order.
    fn snapshot(&self) -> Result<Vec<FacilityRecord>, DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}
