//! Credential hashing and random generation.
//!
//! Passwords are stored as hex-encoded SHA-256 digests of
//! `plaintext + salt`, where the salt is a single process-wide secret
//! loaded at startup. The digest is deterministic so validation is a
//! straight equality check — plaintext is never retained after issuance.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Characters used for generated usernames.
pub const USERNAME_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Characters used for generated passwords (alphanumeric plus symbols).
pub const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";

/// Generated username length.
pub const USERNAME_LEN: usize = 8;

/// Generated password length.
pub const PASSWORD_LEN: usize = 12;

/// Hash a password with the process-wide salt (hex-encoded SHA-256).
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Draw a random string of `len` characters from `alphabet`.
///
/// Bytes come from the OS CSPRNG — these strings are login credentials,
/// so a non-cryptographic source is never acceptable here. Each byte is
/// reduced with `% alphabet.len()`; the slight modulo bias is tolerated.
pub fn random_string(len: usize, alphabet: &[u8]) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| alphabet[*b as usize % alphabet.len()] as char)
        .collect()
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let h1 = hash_password("xT9!qR2vLk@p", "fixed_salt_value");
        let h2 = hash_password("xT9!qR2vLk@p", "fixed_salt_value");
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_differs_per_password() {
        let h1 = hash_password("password_one", "salt");
        let h2 = hash_password("password_two", "salt");
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_differs_per_salt() {
        let h1 = hash_password("password", "salt_a");
        let h2 = hash_password("password", "salt_b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_is_fixed_length_hex() {
        let h = hash_password("anything", "salt");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_string_length() {
        assert_eq!(random_string(8, USERNAME_ALPHABET).len(), 8);
        assert_eq!(random_string(12, PASSWORD_ALPHABET).len(), 12);
        assert_eq!(random_string(0, USERNAME_ALPHABET).len(), 0);
    }

    #[test]
    fn random_string_stays_in_alphabet() {
        let s = random_string(256, USERNAME_ALPHABET);
        assert!(s.bytes().all(|b| USERNAME_ALPHABET.contains(&b)));

        let s = random_string(256, PASSWORD_ALPHABET);
        assert!(s.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
    }

    #[test]
    fn random_strings_are_distinct() {
        // 62^32 combinations — a collision here means the RNG is broken.
        let a = random_string(32, USERNAME_ALPHABET);
        let b = random_string(32, USERNAME_ALPHABET);
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
