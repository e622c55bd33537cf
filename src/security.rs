//! Hashing and token primitives shared by the authentication engine,
//! migrations, and the CLI.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};

/// Length of the random autologin token stored in `user_cookies`.
pub const AUTOLOGIN_TOKEN_LEN: usize = 128;

/// Length of the per-account password salt.
pub const SALT_LEN: usize = 16;

/// Hash a password with its account salt. The stored `password_hash` is
/// the hex digest of `salt + password`.
#[must_use]
pub fn credential_hash(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Token binding a session to the password hash it was established with.
/// Changing the password anywhere invalidates every live session still
/// carrying the old binding.
#[must_use]
pub fn session_token(user_id: i32, password_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_string().as_bytes());
    hasher.update(password_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Equality over hex digests without short-circuiting on the first
/// mismatched byte.
#[must_use]
pub fn digests_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Random alphanumeric string of the given length.
#[must_use]
pub fn random_alnum(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh salt for a new or re-hashed account password.
#[must_use]
pub fn generate_salt() -> String {
    random_alnum(SALT_LEN)
}

/// Source of autologin token material. Injected so tests can run with a
/// deterministic sequence.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> String;
}

/// OS-seeded generator producing full-length alphanumeric tokens.
pub struct OsTokens;

impl TokenSource for OsTokens {
    fn token(&self) -> String {
        random_alnum(AUTOLOGIN_TOKEN_LEN)
    }
}

/// Time source. Injected so attempt-expiry and token-age logic is
/// testable against a fixed instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timestamps are stored as RFC 3339 UTC strings; with one fixed format
/// they order lexicographically in SQL comparisons.
#[must_use]
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn credential_hash_is_deterministic() {
        let a = credential_hash("pepper", "hunter2");
        let b = credential_hash("pepper", "hunter2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn credential_hash_depends_on_salt() {
        assert_ne!(
            credential_hash("salt-a", "hunter2"),
            credential_hash("salt-b", "hunter2")
        );
    }

    #[test]
    fn session_token_changes_with_password_hash() {
        let old = session_token(7, "old-hash");
        let new = session_token(7, "new-hash");
        assert_ne!(old, new);
        assert_eq!(old, session_token(7, "old-hash"));
    }

    #[test]
    fn digests_match_rejects_near_misses() {
        let token = session_token(1, "hash");
        assert!(digests_match(&token, &token));
        assert!(!digests_match(&token, &token[..63]));

        let mut flipped = token.clone().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        assert!(!digests_match(&token, &String::from_utf8(flipped).unwrap()));
    }

    #[test]
    fn generated_tokens_are_alnum_and_full_length() {
        let token = OsTokens.token();
        assert_eq!(token.len(), AUTOLOGIN_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn timestamps_order_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }
}
