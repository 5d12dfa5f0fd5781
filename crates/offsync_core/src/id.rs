//! Record id generation.

use offsync_sync_protocol::RecordId;
use uuid::Uuid;

/// Generates a new unique record id.
///
/// Ids are random v4 UUIDs in their hyphenated text form.
#[must_use]
pub fn generate_id() -> RecordId {
    RecordId::new(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn ids_are_valid_keys() {
        let id = generate_id();
        assert_eq!(id.as_str().len(), 36);
        assert!(RecordId::from_value(&serde_json::Value::String(id.to_string())).is_some());
    }
}
