//! End-to-end credential lifecycle: slash-command issuance through the
//! store, then validation the way the HTTP surface performs it.

use std::sync::Arc;

use passforge::channels::discord::{credentials_embed, parse_interaction};
use passforge::security::{hash_password, PASSWORD_ALPHABET, USERNAME_ALPHABET};
use passforge::store::{CredentialStore, ValidationFailure, CREDENTIAL_TTL_SECS};

const NOW: u64 = 1_700_000_000;

#[test]
fn generate_then_validate_round_trip() {
    let store = CredentialStore::new("integration_salt");
    let issued = store.generate_at(NOW);

    // Issued pair matches the documented shape.
    assert_eq!(issued.username.len(), 8);
    assert!(issued.username.bytes().all(|b| USERNAME_ALPHABET.contains(&b)));
    assert_eq!(issued.password.len(), 12);
    assert!(issued.password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
    assert_eq!(issued.expires_at, NOW + CREDENTIAL_TTL_SECS);

    // Valid immediately, with the auto-generated flag.
    let valid = store
        .validate_at(&issued.username, &issued.password, NOW)
        .expect("freshly generated credentials must validate");
    assert!(!valid.manually_registered);
    assert_eq!(valid.expires_at, issued.expires_at);

    // Wrong password rejects without revealing which part was wrong.
    assert_eq!(
        store.validate_at(&issued.username, "xT9!qR2vLk@p", NOW),
        Err(ValidationFailure::WrongPassword)
    );
}

#[test]
fn expired_credentials_stay_until_next_command() {
    let store = CredentialStore::new("integration_salt");
    let issued = store.generate_at(NOW);
    let after_expiry = issued.expires_at + 60;

    // The validation surface rejects but never evicts.
    assert_eq!(
        store.validate_at(&issued.username, &issued.password, after_expiry),
        Err(ValidationFailure::Expired)
    );
    assert!(store.contains(&issued.username));

    // The next command invocation sweeps it out; validation now reports
    // unknown-user instead of a password mismatch.
    store.register_at("admin_user", "admin_password", after_expiry);
    assert!(!store.contains(&issued.username));
    assert_eq!(
        store.validate_at(&issued.username, &issued.password, after_expiry),
        Err(ValidationFailure::UnknownUser)
    );
}

#[test]
fn manual_registration_outlives_ttl() {
    let store = CredentialStore::new("integration_salt");
    store.register_at("service_account", "hunter2hunter2", NOW);

    let a_week_later = NOW + 7 * 24 * 3600;
    store.generate_at(a_week_later); // command path sweeps

    let valid = store
        .validate_at("service_account", "hunter2hunter2", a_week_later)
        .expect("manual credentials must survive sweeps and TTL");
    assert!(valid.manually_registered);
}

#[test]
fn register_command_flow_from_interaction_payload() {
    let store = Arc::new(CredentialStore::new("integration_salt"));

    let payload = serde_json::json!({
        "type": 2,
        "id": "901",
        "token": "interaction_token",
        "data": {
            "name": "register",
            "options": [
                {"name": "username", "type": 3, "value": "ops_login"},
                {"name": "password", "type": 3, "value": "N0t-s0-secret"},
            ],
        },
        "member": {"user": {"id": "invoker_7"}, "roles": ["role_ops"]},
    });

    let command = parse_interaction(&payload).expect("valid register interaction");
    let username = command.options.get("username").unwrap();
    let password = command.options.get("password").unwrap();

    store.register(username, password);
    assert!(store.validate(username, password).unwrap().manually_registered);
}

#[test]
fn issued_embed_carries_the_only_plaintext_copy() {
    let store = CredentialStore::new("integration_salt");
    let issued = store.generate_at(NOW);

    let embed = credentials_embed(&issued);
    let rendered = embed.to_string();
    assert!(rendered.contains(&issued.username));
    assert!(rendered.contains(&issued.password));

    // The store only ever holds the digest.
    let digest = hash_password(&issued.password, "integration_salt");
    assert_eq!(digest.len(), 64);
    assert_ne!(digest, issued.password);
}
