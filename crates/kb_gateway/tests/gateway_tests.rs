use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::TempDir;

use kb_crypto::{keypair, CryptoError, KeyPairGenerator, RsaKeyPair, SessionKey};
use kb_gateway::{GatewayError, Relay, RelaySettings, WorkforceDirectory};
use kb_proto::{wire, ImportEntry, Scheme};

/// Small test keys: raw-RSA capacity is plenty for a key-delivery payload
/// and generation stays fast. Production uses `Rsa2048Generator`.
struct TestKeyGen;

impl KeyPairGenerator for TestKeyGen {
    fn generate(&self) -> Result<RsaKeyPair, CryptoError> {
        let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(RsaKeyPair::from_private_key(private))
    }
}

struct StaticDirectory(Vec<i64>);

#[async_trait::async_trait]
impl WorkforceDirectory for StaticDirectory {
    async fn active_identity_ids(&self) -> Result<Vec<i64>, GatewayError> {
        Ok(self.0.clone())
    }
}

async fn open_relay(dir: &TempDir, applications: &[&str]) -> Result<Relay> {
    let settings = RelaySettings {
        db_path: dir.path().join("relay.db"),
        applications: applications.iter().map(|a| a.to_string()).collect(),
    };
    Ok(Relay::open_with_generator(&settings, Arc::new(TestKeyGen)).await?)
}

/// What the external side does: raw-RSA-encrypt a JSON payload to one
/// user's published public key.
fn rsa_payload(public_pem: &str, payload: &Value) -> Result<String> {
    let public = keypair::public_key_from_pem(public_pem)?;
    let ciphertext = keypair::encrypt_raw(&public, &serde_json::to_vec(payload)?)?;
    Ok(wire::encode_rsa_payload(&ciphertext))
}

/// What the external side does once bootstrapped: AES-encrypt a JSON
/// payload under the delivered session key.
fn aes_payload(key: &SessionKey, payload: &Value) -> Result<String> {
    let plaintext = serde_json::to_vec(payload)?;
    let (ciphertext, iv) = kb_crypto::session::encrypt(key, &plaintext)?;
    Ok(wire::encode_aes_payload(&ciphertext, &iv))
}

/// Provision one identity and return its pseudonymous id and public key.
async fn bootstrap_identity(
    relay: &Relay,
    identity_id: i64,
    application: &str,
) -> Result<(String, String)> {
    relay.keystore.initialize(identity_id).await?;
    relay.identities.provision(application).await?;
    let keys = relay.identities.public_keys_for(application).await?;
    let row = relay
        .store
        .application_identity(identity_id, application)
        .await?
        .expect("binding exists");
    let pem = keys.get(&row.external_user_id).expect("public key exported").clone();
    Ok((row.external_user_id, pem))
}

#[tokio::test]
async fn bootstrap_then_message_in_one_retrieve() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    let (external_id, public_pem) = bootstrap_identity(&relay, 42, "timeclock").await?;

    let session = SessionKey::generate();
    let bootstrap = rsa_payload(
        &public_pem,
        &json!([{ "session_key": session.to_hex() }, { "note": "welcome" }]),
    )?;
    let message = aes_payload(&session, &json!([{ "msg": "hi" }]))?;

    let imported = relay
        .gateway
        .import(
            "timeclock",
            &[
                ImportEntry {
                    external_user_id: external_id.clone(),
                    scheme: Scheme::Rsa,
                    payload: bootstrap,
                },
                ImportEntry {
                    external_user_id: external_id,
                    scheme: Scheme::Aes,
                    payload: message,
                },
            ],
        )
        .await?;
    assert_eq!(imported, 2);

    let results = relay.gateway.retrieve_for("timeclock", 42).await?;
    // rsa-derived content first, then aes-derived; the key-delivery marker
    // itself never appears.
    assert_eq!(results, vec![json!({ "note": "welcome" }), json!({ "msg": "hi" })]);

    let stored = relay
        .identities
        .session_key(42, "timeclock")
        .await?
        .expect("session key persisted");
    assert_eq!(stored.to_hex(), session.to_hex());

    // Everything was consumed.
    assert!(relay.gateway.retrieve_for("timeclock", 42).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn submit_requires_bootstrap_then_exports_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    bootstrap_identity(&relay, 42, "timeclock").await?;

    // Before bootstrap: precondition error, nothing stored.
    let err = relay
        .gateway
        .submit("timeclock", 42, json!({ "msg": "hi" }))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SessionNotBootstrapped { .. }));
    assert!(relay.gateway.export("timeclock").await?.is_empty());

    // Unknown binding: not-found error.
    let err = relay
        .gateway
        .submit("timeclock", 777, json!({ "msg": "hi" }))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnknownApplicationUser { .. }));

    let session = SessionKey::generate();
    relay
        .identities
        .rotate_session_key(42, "timeclock", &session)
        .await?;
    relay
        .gateway
        .submit("timeclock", 42, json!({ "msg": "hi" }))
        .await?;

    let exported = relay.gateway.export("timeclock").await?;
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].scheme, Scheme::Aes);
    assert!(exported[0].payload.contains(":::"));

    // The external side can decrypt it, and the sequence arrives whole.
    let (ciphertext, iv) = wire::split_aes_payload(&exported[0].payload)?;
    let plaintext = kb_crypto::session::decrypt(&session, &iv, &ciphertext)?;
    let decoded: Value = serde_json::from_slice(&plaintext)?;
    assert_eq!(decoded, json!([{ "msg": "hi" }]));

    // Idempotent export: the queue was drained exactly once.
    assert!(relay.gateway.export("timeclock").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn submit_array_becomes_one_packet() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    bootstrap_identity(&relay, 7, "timeclock").await?;
    let session = SessionKey::generate();
    relay
        .identities
        .rotate_session_key(7, "timeclock", &session)
        .await?;

    relay
        .gateway
        .submit("timeclock", 7, json!([{ "a": 1 }, { "b": 2 }]))
        .await?;
    let exported = relay.gateway.export("timeclock").await?;
    assert_eq!(exported.len(), 1);

    let (ciphertext, iv) = wire::split_aes_payload(&exported[0].payload)?;
    let plaintext = kb_crypto::session::decrypt(&session, &iv, &ciphertext)?;
    let decoded: Value = serde_json::from_slice(&plaintext)?;
    assert_eq!(decoded, json!([{ "a": 1 }, { "b": 2 }]));
    Ok(())
}

#[tokio::test]
async fn import_skips_unknown_users_without_failing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    let (external_id, _) = bootstrap_identity(&relay, 1, "timeclock").await?;

    let imported = relay
        .gateway
        .import(
            "timeclock",
            &[
                ImportEntry {
                    external_user_id: "no-such-user".into(),
                    scheme: Scheme::Plaintext,
                    payload: r#"[{"lost":true}]"#.into(),
                },
                ImportEntry {
                    external_user_id: external_id,
                    scheme: Scheme::Plaintext,
                    payload: r#"[{"kept":true}]"#.into(),
                },
            ],
        )
        .await?;
    assert_eq!(imported, 1);

    let results = relay.gateway.retrieve_for("timeclock", 1).await?;
    assert_eq!(results, vec![json!({ "kept": true })]);
    Ok(())
}

#[tokio::test]
async fn undecryptable_packet_survives_until_its_key_arrives() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    let (external_id, public_pem) = bootstrap_identity(&relay, 3, "timeclock").await?;

    // The session message arrives BEFORE its key was bootstrapped.
    let session = SessionKey::generate();
    let message = aes_payload(&session, &json!([{ "early": true }]))?;
    relay
        .gateway
        .import(
            "timeclock",
            &[ImportEntry {
                external_user_id: external_id.clone(),
                scheme: Scheme::Aes,
                payload: message,
            }],
        )
        .await?;

    // No key yet: nothing decrypts, nothing is lost.
    assert!(relay.gateway.retrieve_for("timeclock", 3).await?.is_empty());
    assert!(relay.gateway.retrieve_for("timeclock", 3).await?.is_empty());

    // The bootstrap catches up; the retained packet now resolves.
    let bootstrap = rsa_payload(&public_pem, &json!([{ "session_key": session.to_hex() }]))?;
    relay
        .gateway
        .import(
            "timeclock",
            &[ImportEntry {
                external_user_id: external_id,
                scheme: Scheme::Rsa,
                payload: bootstrap,
            }],
        )
        .await?;
    let results = relay.gateway.retrieve_for("timeclock", 3).await?;
    assert_eq!(results, vec![json!({ "early": true })]);
    Ok(())
}

#[tokio::test]
async fn key_delivery_on_session_channel_does_not_rotate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    let (external_id, _) = bootstrap_identity(&relay, 9, "timeclock").await?;

    let session = SessionKey::generate();
    relay
        .identities
        .rotate_session_key(9, "timeclock", &session)
        .await?;

    // A marker smuggled over the aes channel is dropped from results and
    // must not overwrite the session key.
    let smuggled = SessionKey::generate();
    let payload = aes_payload(
        &session,
        &json!([{ "session_key": smuggled.to_hex() }, { "msg": "real" }]),
    )?;
    relay
        .gateway
        .import(
            "timeclock",
            &[ImportEntry {
                external_user_id: external_id,
                scheme: Scheme::Aes,
                payload,
            }],
        )
        .await?;

    let results = relay.gateway.retrieve_for("timeclock", 9).await?;
    assert_eq!(results, vec![json!({ "msg": "real" })]);

    let current = relay.identities.session_key(9, "timeclock").await?.unwrap();
    assert_eq!(current.to_hex(), session.to_hex());

    // The packet was consumed even though part of it was filtered.
    assert!(relay.gateway.retrieve_for("timeclock", 9).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn retrieve_flattens_arrays_and_passes_scalars_through() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    let (external_id, _) = bootstrap_identity(&relay, 5, "timeclock").await?;

    relay
        .gateway
        .import(
            "timeclock",
            &[
                ImportEntry {
                    external_user_id: external_id.clone(),
                    scheme: Scheme::Plaintext,
                    payload: r#"[{"a":1},{"b":2}]"#.into(),
                },
                ImportEntry {
                    external_user_id: external_id,
                    scheme: Scheme::Plaintext,
                    payload: r#"{"single":true}"#.into(),
                },
            ],
        )
        .await?;

    let results = relay.gateway.retrieve_for("timeclock", 5).await?;
    assert_eq!(
        results,
        vec![json!({ "a": 1 }), json!({ "b": 2 }), json!({ "single": true })]
    );
    Ok(())
}

#[tokio::test]
async fn initialize_rejects_non_positive_identities() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &[]).await?;

    for bad in [0, -3] {
        let err = relay.keystore.initialize(bad).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentity(id) if id == bad));
    }
    Ok(())
}

#[tokio::test]
async fn initialize_missing_fills_the_directory_gap() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &[]).await?;

    relay.keystore.initialize(2).await?;
    let directory = StaticDirectory(vec![1, 2, 3]);

    let created = relay.keystore.initialize_missing(&directory).await?;
    assert_eq!(created, 2);
    assert_eq!(relay.store.identity_ids().await?, vec![1, 2, 3]);

    // Re-running finds nothing to do and replaces no keys.
    let before = relay.store.identity(1).await?.unwrap().rsa_public_key;
    assert_eq!(relay.keystore.initialize_missing(&directory).await?, 0);
    let after = relay.store.identity(1).await?.unwrap().rsa_public_key;
    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn replacing_keys_strands_old_bootstrap_packets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let relay = open_relay(&dir, &["timeclock"]).await?;
    let (external_id, old_pem) = bootstrap_identity(&relay, 11, "timeclock").await?;

    let session = SessionKey::generate();
    let bootstrap = rsa_payload(&old_pem, &json!([{ "session_key": session.to_hex() }]))?;

    // Keys are replaced before the bootstrap packet is consumed.
    relay.keystore.initialize(11).await?;
    relay
        .gateway
        .import(
            "timeclock",
            &[ImportEntry {
                external_user_id: external_id,
                scheme: Scheme::Rsa,
                payload: bootstrap,
            }],
        )
        .await?;

    // The packet stays queued, undecryptable under the new key; the
    // accepted recovery is a fresh bootstrap from the external side.
    assert!(relay.gateway.retrieve_for("timeclock", 11).await?.is_empty());
    assert!(relay.identities.session_key(11, "timeclock").await?.is_none());
    Ok(())
}
