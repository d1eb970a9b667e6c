//! The change envelope broadcast to dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
    Replace,
}

impl OperationType {
    pub const ALL: [OperationType; 4] = [
        OperationType::Insert,
        OperationType::Update,
        OperationType::Delete,
        OperationType::Replace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Replace => "replace",
        }
    }

    /// Suffix used in category-specific event names.
    pub fn past_tense(&self) -> &'static str {
        match self {
            OperationType::Insert => "created",
            OperationType::Update => "updated",
            OperationType::Delete => "deleted",
            OperationType::Replace => "replaced",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(OperationType::Insert),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            "replace" => Ok(OperationType::Replace),
            other => Err(format!("Unknown operation type: {}", other)),
        }
    }
}

/// Watched record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Orders,
    Bookings,
    Contacts,
    Customers,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Orders,
        Collection::Bookings,
        Collection::Contacts,
        Collection::Customers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Orders => "orders",
            Collection::Bookings => "bookings",
            Collection::Contacts => "contacts",
            Collection::Customers => "customers",
        }
    }

    /// Table the change log records this collection under.
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Customers => "users",
            other => other.name(),
        }
    }

    pub fn event_prefix(&self) -> &'static str {
        match self {
            Collection::Orders => "order",
            Collection::Bookings => "booking",
            Collection::Contacts => "contact",
            Collection::Customers => "user",
        }
    }

    pub fn catch_all_event(&self) -> &'static str {
        match self {
            Collection::Orders => "newOrder",
            Collection::Bookings => "newBooking",
            Collection::Contacts => "newContact",
            Collection::Customers => "newCustomer",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescription {
    pub updated_fields: Map<String, Value>,
    pub removed_fields: Vec<String>,
}

impl UpdateDescription {
    /// Field-level difference between two JSON objects. Fields that vanished
    /// or became null count as removed.
    pub fn diff(before: &Value, after: &Value) -> Self {
        let empty = Map::new();
        let before = before.as_object().unwrap_or(&empty);
        let after = after.as_object().unwrap_or(&empty);

        let mut description = UpdateDescription::default();
        for (key, value) in after {
            if value.is_null() {
                if before.get(key).is_some_and(|old| !old.is_null()) {
                    description.removed_fields.push(key.clone());
                }
            } else if before.get(key) != Some(value) {
                description.updated_fields.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in before {
            if !after.contains_key(key) && !value.is_null() {
                description.removed_fields.push(key.clone());
            }
        }
        description.removed_fields.sort();
        description
    }

    pub fn is_empty(&self) -> bool {
        self.updated_fields.is_empty() && self.removed_fields.is_empty()
    }
}

/// One mutation as read from a change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    pub operation_type: OperationType,
    pub document_key: String,
    pub full_document: Option<Value>,
    pub update_description: Option<UpdateDescription>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub operation_type: OperationType,
    pub document_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_document: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_description: Option<UpdateDescription>,
}

impl From<RawChange> for ChangeEvent {
    fn from(raw: RawChange) -> Self {
        Self {
            operation_type: raw.operation_type,
            document_id: raw.document_key,
            timestamp: raw.occurred_at,
            full_document: raw.full_document,
            update_description: raw.update_description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_reports_changed_and_removed_fields() {
        let before = json!({"id": "b1", "status": "pending", "notes": "window seat", "time": "10:00"});
        let after = json!({"id": "b1", "status": "confirmed", "notes": null, "time": "10:00"});

        let diff = UpdateDescription::diff(&before, &after);
        assert_eq!(diff.updated_fields.get("status"), Some(&json!("confirmed")));
        assert_eq!(diff.updated_fields.len(), 1);
        assert_eq!(diff.removed_fields, vec!["notes".to_string()]);
    }

    #[test]
    fn test_diff_of_identical_documents_is_empty() {
        let doc = json!({"id": "o1", "total_cents": 100});
        assert!(UpdateDescription::diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let raw = RawChange {
            operation_type: OperationType::Insert,
            document_key: "c1".to_string(),
            full_document: Some(json!({"id": "c1", "name": "An"})),
            update_description: None,
            occurred_at: DateTime::parse_from_rfc3339("2025-06-10T07:00:00Z").unwrap().with_timezone(&Utc),
        };
        let value = serde_json::to_value(ChangeEvent::from(raw)).unwrap();

        assert_eq!(value["operationType"], "insert");
        assert_eq!(value["documentId"], "c1");
        assert_eq!(value["fullDocument"]["name"], "An");
        assert!(value.get("updateDescription").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_event_names_per_collection() {
        assert_eq!(Collection::Customers.table(), "users");
        assert_eq!(Collection::Customers.event_prefix(), "user");
        assert_eq!(Collection::Contacts.catch_all_event(), "newContact");
        assert_eq!(OperationType::Replace.past_tense(), "replaced");
    }
}
