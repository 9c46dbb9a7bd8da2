//! Broadcast payloads exchanged between instances of the same store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mutation announced to sibling instances.
///
/// Wire form (JSON):
/// ```text
/// { "kind": "set",    "storeName": "...", "key": "...", "value": ... }
/// { "kind": "delete", "storeName": "...", "key": "..." }
/// { "kind": "clear",  "storeName": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SyncEvent {
    /// A key was written.
    Set {
        #[serde(rename = "storeName")]
        store_name: String,
        key: String,
        value: Value,
    },
    /// A key was removed.
    Delete {
        #[serde(rename = "storeName")]
        store_name: String,
        key: String,
    },
    /// Every key was removed.
    Clear {
        #[serde(rename = "storeName")]
        store_name: String,
    },
}

impl SyncEvent {
    /// The store this event belongs to.
    pub fn store_name(&self) -> &str {
        match self {
            Self::Set { store_name, .. }
            | Self::Delete { store_name, .. }
            | Self::Clear { store_name } => store_name,
        }
    }

    /// Encode for the bus.
    pub fn to_payload(&self) -> Value {
        // A map of strings and JSON values cannot fail to serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode a bus payload. Returns `None` for anything malformed.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Self::deserialize(payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape() {
        let event = SyncEvent::Set {
            store_name: "prefs".into(),
            key: "theme".into(),
            value: json!({"mode": "dark"}),
        };
        assert_eq!(
            event.to_payload(),
            json!({"kind": "set", "storeName": "prefs", "key": "theme", "value": {"mode": "dark"}})
        );
        assert_eq!(
            SyncEvent::Clear {
                store_name: "prefs".into()
            }
            .to_payload(),
            json!({"kind": "clear", "storeName": "prefs"})
        );
    }

    #[test]
    fn decodes_delete() {
        let payload = json!({"kind": "delete", "storeName": "s", "key": "k"});
        assert_eq!(
            SyncEvent::from_payload(&payload),
            Some(SyncEvent::Delete {
                store_name: "s".into(),
                key: "k".into()
            })
        );
    }

    #[test]
    fn rejects_malformed() {
        for payload in [
            json!(null),
            json!("set"),
            json!({"kind": "rename", "storeName": "s"}),
            json!({"kind": "set", "storeName": "s", "key": "k"}),
            json!({"kind": "delete", "key": "k"}),
        ] {
            assert_eq!(SyncEvent::from_payload(&payload), None, "{payload}");
        }
    }

    #[test]
    fn set_with_null_value_is_valid() {
        let payload = json!({"kind": "set", "storeName": "s", "key": "k", "value": null});
        assert!(matches!(
            SyncEvent::from_payload(&payload),
            Some(SyncEvent::Set { value: Value::Null, .. })
        ));
    }
}
