//! Relay channel contracts: what crosses the external boundary.
//! These map directly to JSON bodies on the wire.

use serde::{Deserialize, Serialize};

use crate::packet::{Direction, Scheme};

/// One inbound record from the external relay channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEntry {
    /// Pseudonymous per-application user id.
    pub external_user_id: String,
    pub scheme: Scheme,
    /// Raw payload, still encrypted. Decryption is deferred to retrieval.
    pub payload: String,
}

/// One outbound record handed to the external relay channel.
/// Internal identity ids never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEntry {
    pub external_user_id: String,
    pub scheme: Scheme,
    /// Always `to-external` in practice; kept for contract symmetry.
    pub direction: Direction,
    pub payload: String,
}

/// Session-key delivery marker.
///
/// A decrypted bootstrap value is key delivery, not message content, exactly
/// when it is a JSON object with this single field. `deny_unknown_fields`
/// keeps the discriminant unambiguous: an object carrying anything else is
/// ordinary payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyDelivery {
    /// Hex-encoded 32-byte AES session key.
    pub session_key: String,
}

impl KeyDelivery {
    /// Match a decrypted JSON value against the marker shape.
    pub fn from_value(value: &serde_json::Value) -> Option<KeyDelivery> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_delivery_matches_exact_shape() {
        let marker = json!({ "session_key": "ab".repeat(32) });
        assert!(KeyDelivery::from_value(&marker).is_some());
    }

    #[test]
    fn key_delivery_rejects_extra_fields() {
        let not_marker = json!({ "session_key": "ab".repeat(32), "note": "hi" });
        assert!(KeyDelivery::from_value(&not_marker).is_none());
    }

    #[test]
    fn key_delivery_rejects_wrong_shapes() {
        assert!(KeyDelivery::from_value(&json!("session_key")).is_none());
        assert!(KeyDelivery::from_value(&json!(["session_key"])).is_none());
        assert!(KeyDelivery::from_value(&json!({ "session_key": 42 })).is_none());
    }

    #[test]
    fn import_entry_parses_contract_json() {
        let entry: ImportEntry = serde_json::from_str(
            r#"{ "external_user_id": "1db00806-c85b-11e7", "scheme": "aes", "payload": "x:::00" }"#,
        )
        .unwrap();
        assert_eq!(entry.scheme, Scheme::Aes);
        assert_eq!(entry.external_user_id, "1db00806-c85b-11e7");
    }
}
