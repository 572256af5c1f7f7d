//! In-memory credential store.
//!
//! One record per username: salted password hash, expiry timestamp, and a
//! manual-registration flag. Auto-generated credentials live for 12 hours;
//! manually registered ones are exempt from expiry — both for the cleanup
//! sweep and for validation (their expiry is computed anyway, but only for
//! informational display).
//!
//! ## Cleanup model
//! The sweep runs lazily from the command path (`generate` / `register`)
//! only — validation never sweeps. An expired auto-generated record
//! therefore stays in the map (and is rejected by the expiry check, not
//! deleted) until the next slash command arrives. Callers relying on
//! eviction timing should know about this window.
//!
//! ## Concurrency
//! The tokio runtime is multi-threaded, so the map sits behind a
//! `parking_lot::Mutex`; each operation holds the lock across its whole
//! read-modify-write sequence (sweep-then-insert on generate,
//! overwrite on register).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::security::{
    self, hash_password, PASSWORD_ALPHABET, PASSWORD_LEN, USERNAME_ALPHABET, USERNAME_LEN,
};

/// Credential lifetime: 12 hours (seconds).
pub const CREDENTIAL_TTL_SECS: u64 = 12 * 3600;

/// A stored credential, keyed by username in the store.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// Hex-encoded SHA-256 of `password + salt`. Plaintext is never kept.
    pub password_hash: String,
    /// Unix timestamp after which an auto-generated credential is invalid.
    pub expires_at: u64,
    /// Manually registered credentials never expire; the timestamp above
    /// is informational only for them.
    pub manually_registered: bool,
}

/// A freshly generated credential pair. The plaintext password exists
/// only in this value — the store keeps the hash.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub username: String,
    pub password: String,
    pub expires_at: u64,
}

/// Result of a manual registration.
#[derive(Debug, Clone)]
pub struct RegisteredCredential {
    pub username: String,
    pub expires_at: u64,
}

/// A successfully validated credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCredential {
    pub expires_at: u64,
    pub manually_registered: bool,
}

/// Why a validation attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Username or password was empty.
    MissingInput,
    /// No record exists for the username.
    UnknownUser,
    /// Record exists but the hash does not match.
    WrongPassword,
    /// Hash matched but the (non-manual) credential has expired.
    Expired,
}

/// Thread-safe in-memory credential store.
///
/// State is process-local and lost on restart by design. The store
/// performs no authorization — the Discord command surface gates
/// `/register` before calling in.
pub struct CredentialStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
    salt: String,
}

impl CredentialStore {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            salt: salt.into(),
        }
    }

    /// Generate a random credential pair and store its hash.
    ///
    /// Sweeps expired auto-generated records first, then inserts. A
    /// username collision (62^8 space) silently overwrites, matching
    /// register semantics.
    pub fn generate(&self) -> IssuedCredential {
        self.generate_at(epoch_secs())
    }

    pub fn generate_at(&self, now: u64) -> IssuedCredential {
        let username = security::random_string(USERNAME_LEN, USERNAME_ALPHABET);
        let password = security::random_string(PASSWORD_LEN, PASSWORD_ALPHABET);
        let expires_at = now + CREDENTIAL_TTL_SECS;

        let mut records = self.records.lock();
        sweep(&mut records, now);
        records.insert(
            username.clone(),
            CredentialRecord {
                password_hash: hash_password(&password, &self.salt),
                expires_at,
                manually_registered: false,
            },
        );

        tracing::info!(username = %username, expires_at, "Generated credentials");

        IssuedCredential {
            username,
            password,
            expires_at,
        }
    }

    /// Register caller-supplied credentials (privileged path).
    ///
    /// No uniqueness pre-check — an existing record for the same username
    /// is overwritten entirely. The expiry is computed for display but the
    /// record is exempt from expiry-based deletion and rejection.
    pub fn register(&self, username: &str, password: &str) -> RegisteredCredential {
        self.register_at(username, password, epoch_secs())
    }

    pub fn register_at(&self, username: &str, password: &str, now: u64) -> RegisteredCredential {
        let expires_at = now + CREDENTIAL_TTL_SECS;

        let mut records = self.records.lock();
        sweep(&mut records, now);
        records.insert(
            username.to_string(),
            CredentialRecord {
                password_hash: hash_password(password, &self.salt),
                expires_at,
                manually_registered: true,
            },
        );

        tracing::info!(username = %username, "Registered manual credentials");

        RegisteredCredential {
            username: username.to_string(),
            expires_at,
        }
    }

    /// Validate a username/password pair.
    ///
    /// Fails closed: empty input, unknown username, or hash mismatch all
    /// reject. A matching hash is accepted when the record is manually
    /// registered or not yet expired. Never sweeps.
    pub fn validate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ValidatedCredential, ValidationFailure> {
        self.validate_at(username, password, epoch_secs())
    }

    pub fn validate_at(
        &self,
        username: &str,
        password: &str,
        now: u64,
    ) -> Result<ValidatedCredential, ValidationFailure> {
        if username.is_empty() || password.is_empty() {
            return Err(ValidationFailure::MissingInput);
        }

        let records = self.records.lock();
        let record = records
            .get(username)
            .ok_or(ValidationFailure::UnknownUser)?;

        let attempt = hash_password(password, &self.salt);
        if !security::constant_time_eq(record.password_hash.as_bytes(), attempt.as_bytes()) {
            return Err(ValidationFailure::WrongPassword);
        }

        if !record.manually_registered && record.expires_at <= now {
            return Err(ValidationFailure::Expired);
        }

        Ok(ValidatedCredential {
            expires_at: record.expires_at,
            manually_registered: record.manually_registered,
        })
    }

    /// Delete expired auto-generated records. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(epoch_secs())
    }

    pub fn cleanup_expired_at(&self, now: u64) -> usize {
        let mut records = self.records.lock();
        sweep(&mut records, now)
    }

    /// Number of stored records (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Whether a record exists for the username, regardless of expiry.
    pub fn contains(&self, username: &str) -> bool {
        self.records.lock().contains_key(username)
    }
}

/// Remove expired, non-manual records from the map. Caller holds the lock.
fn sweep(records: &mut HashMap<String, CredentialRecord>, now: u64) -> usize {
    let before = records.len();
    records.retain(|username, record| {
        let keep = record.manually_registered || record.expires_at >= now;
        if !keep {
            tracing::info!(username = %username, "Expired auto-generated credentials deleted");
        }
        keep
    });
    before - records.len()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
