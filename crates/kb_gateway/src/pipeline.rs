//! Stateless packet decryption pipeline.
//!
//! Per-packet state machine, forward-only:
//!
//! ```text
//! rsa       --decrypt ok-->  plaintext
//! rsa       --failure---->   unchanged (retried on a later call)
//! aes       --decrypt ok-->  plaintext
//! aes       --failure---->   unchanged (retried on a later call)
//! plaintext --(terminal)
//! ```
//!
//! Failures are isolated: one undecryptable packet never aborts its
//! siblings, and absence from the results is the only failure signal a
//! retrieval caller sees.

use serde_json::Value;
use tracing::debug;

use kb_crypto::{session, RsaKeyPair, SessionKey};
use kb_proto::{wire, Scheme};

use crate::error::GatewayError;

/// Key material available for one (identity, application) pair.
#[derive(Default)]
pub struct KeyMaterial<'a> {
    /// The identity's RSA pair (None if the identity is unknown).
    pub rsa: Option<&'a RsaKeyPair>,
    /// The pair's negotiated AES session key (None before bootstrap).
    pub session: Option<&'a SessionKey>,
}

/// Outcome of one decrypt attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decrypted {
    /// The packet reached plaintext and decodes to this value.
    Value(Value),
    /// Decrypt or decode failed; the packet keeps its stored scheme and is
    /// retried on a later call.
    Unchanged,
}

/// Advance one packet towards plaintext.
pub fn decrypt(scheme: Scheme, payload: &str, keys: &KeyMaterial<'_>) -> Decrypted {
    let value = match scheme {
        Scheme::Rsa => decrypt_rsa(payload, keys.rsa),
        Scheme::Aes => decrypt_aes(payload, keys.session),
        Scheme::Plaintext => Some(parse_lenient_str(payload)),
    };
    match value {
        Some(v) => Decrypted::Value(v),
        None => {
            debug!(scheme = scheme.as_tag(), "packet left undecryptable");
            Decrypted::Unchanged
        }
    }
}

/// Encrypt a sequence of values as ONE aes wire payload: JSON array,
/// AES-256-CBC under `key`, fresh random IV. The caller is responsible for
/// having checked that a session key exists.
pub fn encrypt(values: &[Value], key: &SessionKey) -> Result<String, GatewayError> {
    let plaintext = serde_json::to_vec(values)?;
    let (ciphertext, iv) = session::encrypt(key, &plaintext)?;
    Ok(wire::encode_aes_payload(&ciphertext, &iv))
}

fn decrypt_rsa(payload: &str, pair: Option<&RsaKeyPair>) -> Option<Value> {
    let pair = pair?;
    let ciphertext = wire::decode_rsa_payload(payload).ok()?;
    let plaintext = pair.decrypt_raw(&ciphertext).ok()?;
    parse_lenient(&plaintext)
}

fn decrypt_aes(payload: &str, key: Option<&SessionKey>) -> Option<Value> {
    let key = key?;
    let (ciphertext, iv) = wire::split_aes_payload(payload).ok()?;
    let plaintext = session::decrypt(key, &iv, &ciphertext).ok()?;
    parse_lenient(&plaintext)
}

/// Decrypted bytes must be UTF-8; anything else is a failed decrypt, not
/// content. A syntactically invalid JSON plaintext is surfaced as a string
/// value rather than dropped.
fn parse_lenient(plaintext: &[u8]) -> Option<Value> {
    let text = String::from_utf8(plaintext.to_vec()).ok()?;
    Some(parse_lenient_str(&text))
}

fn parse_lenient_str(text: &str) -> Value {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => Value::String(text.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_through_aes_wire_payload() {
        let key = SessionKey::generate();
        let values = vec![json!({ "msg": "hi" }), json!([1, 2, 3]), json!("scalar")];
        let payload = encrypt(&values, &key).unwrap();

        let keys = KeyMaterial { rsa: None, session: Some(&key) };
        match decrypt(Scheme::Aes, &payload, &keys) {
            Decrypted::Value(value) => assert_eq!(value, json!(values)),
            Decrypted::Unchanged => panic!("round trip failed"),
        }
    }

    #[test]
    fn missing_session_key_leaves_packet_unchanged() {
        let keys = KeyMaterial::default();
        assert_eq!(decrypt(Scheme::Aes, "ct:::00ff", &keys), Decrypted::Unchanged);
        assert_eq!(decrypt(Scheme::Rsa, "AAAA", &keys), Decrypted::Unchanged);
    }

    #[test]
    fn malformed_aes_payload_leaves_packet_unchanged() {
        let key = SessionKey::generate();
        let keys = KeyMaterial { rsa: None, session: Some(&key) };
        assert_eq!(decrypt(Scheme::Aes, "no separator here", &keys), Decrypted::Unchanged);
        assert_eq!(decrypt(Scheme::Aes, "!!!not-base64!!!:::00", &keys), Decrypted::Unchanged);
    }

    #[test]
    fn plaintext_scheme_is_terminal_and_lenient() {
        let keys = KeyMaterial::default();
        assert_eq!(
            decrypt(Scheme::Plaintext, r#"{"a":1}"#, &keys),
            Decrypted::Value(json!({ "a": 1 }))
        );
        // Not JSON: surfaced as a raw string, never dropped.
        assert_eq!(
            decrypt(Scheme::Plaintext, "hello there", &keys),
            Decrypted::Value(json!("hello there"))
        );
    }
}
