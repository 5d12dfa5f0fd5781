//! Change entries.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of mutation recorded by a change entry.
///
/// Unknown codes are kept as [`Operation::Other`] so that a download can
/// reject them as a protocol violation instead of failing to decode the
/// whole response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    /// The record was created or replaced.
    Update,
    /// The record was deleted.
    Delete,
    /// An operation code this client does not understand.
    Other(String),
}

impl Operation {
    /// Returns the wire code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Other(code) => code,
        }
    }
}

impl From<String> for Operation {
    fn from(code: String) -> Self {
        match code.as_str() {
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            _ => Operation::Other(code),
        }
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_string()
    }
}

/// A mutation resolved from a valid change entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation<'a> {
    /// Store this record.
    Put(&'a Value),
    /// Remove the record with the entry's id.
    Delete,
}

/// One pending mutation awaiting upload, or one remote mutation to apply.
///
/// `change_set` holds the full record for [`Operation::Update`] and is
/// absent for [`Operation::Delete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Kind of mutation.
    pub operation: Operation,
    /// Id of the affected record.
    pub id: RecordId,
    /// Collection the record belongs to.
    pub collection_name: String,
    /// The full record, for updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set: Option<Value>,
}

impl ChangeEntry {
    /// Creates an UPDATE entry carrying the full record.
    pub fn update(collection_name: impl Into<String>, id: RecordId, record: Value) -> Self {
        Self {
            operation: Operation::Update,
            id,
            collection_name: collection_name.into(),
            change_set: Some(record),
        }
    }

    /// Creates a DELETE entry.
    pub fn delete(collection_name: impl Into<String>, id: RecordId) -> Self {
        Self {
            operation: Operation::Delete,
            id,
            collection_name: collection_name.into(),
            change_set: None,
        }
    }

    /// Resolves the entry into the mutation it describes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownOperation`] for unknown codes and
    /// [`ProtocolError::MissingChangeSet`] for an UPDATE without a record.
    pub fn mutation(&self) -> ProtocolResult<Mutation<'_>> {
        match &self.operation {
            Operation::Update => self
                .change_set
                .as_ref()
                .map(Mutation::Put)
                .ok_or_else(|| ProtocolError::MissingChangeSet {
                    collection: self.collection_name.clone(),
                    id: self.id.to_string(),
                }),
            Operation::Delete => Ok(Mutation::Delete),
            Operation::Other(code) => Err(ProtocolError::UnknownOperation {
                operation: code.clone(),
                collection: self.collection_name.clone(),
                id: self.id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_entry_wire_shape() {
        let entry = ChangeEntry::update("todos", RecordId::from("t1"), json!({"id": "t1", "done": false}));
        let wire = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            wire,
            json!({
                "operation": "UPDATE",
                "id": "t1",
                "collectionName": "todos",
                "changeSet": {"id": "t1", "done": false}
            })
        );
    }

    #[test]
    fn delete_entry_omits_change_set() {
        let entry = ChangeEntry::delete("todos", RecordId::from("t1"));
        let wire = serde_json::to_value(&entry).unwrap();
        assert_eq!(wire, json!({"operation": "DELETE", "id": "t1", "collectionName": "todos"}));
        assert_eq!(entry.mutation().unwrap(), Mutation::Delete);
    }

    #[test]
    fn unknown_operation_survives_decoding() {
        let entry: ChangeEntry = serde_json::from_value(json!({
            "operation": "PATCH",
            "id": 3,
            "collectionName": "todos"
        }))
        .unwrap();

        assert_eq!(entry.operation, Operation::Other("PATCH".into()));
        assert!(matches!(
            entry.mutation(),
            Err(ProtocolError::UnknownOperation { ref operation, .. }) if operation == "PATCH"
        ));
    }

    #[test]
    fn update_without_change_set_is_rejected() {
        let entry = ChangeEntry {
            operation: Operation::Update,
            id: RecordId::from("x"),
            collection_name: "todos".into(),
            change_set: None,
        };
        assert!(matches!(entry.mutation(), Err(ProtocolError::MissingChangeSet { .. })));
    }
}
