//! PIN and admin-password hashing and verification.
//!
//! PINs are never stored in clear. Each activity gets a fresh random salt at
//! creation time; verification recomputes the salted digest and compares it in
//! constant time, so a failed attempt leaks neither content nor timing.

use rand::distributions::Alphanumeric;
use rand::Rng;
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;

/// Salt + salted SHA-256 digest, as stored alongside an activity.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PinCredential {
    pub salt: String,
    pub digest: String,
}

impl PinCredential {
    /// Hashes `pin` under a fresh random salt.
    pub fn issue(pin: &str) -> PinCredential {
        let salt = generate_salt();
        let digest = hash_pin(pin, &salt);
        PinCredential { salt, digest }
    }

    /// Recomputes the digest with the stored salt and compares in constant
    /// time.
    pub fn verify(&self, pin: &str) -> bool {
        let candidate = hash_pin(pin, &self.salt);
        constant_time_eq(&candidate, &self.digest)
    }
}

pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

/// Digest layout: hex of `sha256("{salt}:{pin}")`.
pub fn hash_pin(pin: &str, salt: &str) -> String {
    sha256::digest(format!("{}:{}", salt, pin))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Admin credentials, built once at startup from explicit configuration and
/// handed to whoever gates mutating operations. There is no global admin
/// state to mutate or read ad hoc.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    credential: PinCredential,
}

impl AdminAuth {
    pub fn new(password: &str) -> AdminAuth {
        AdminAuth {
            credential: PinCredential::issue(password),
        }
    }

    pub fn verify(&self, attempt: &str) -> bool {
        self.credential.verify(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_round_trip() {
        let cred = PinCredential::issue("1234");
        assert!(cred.verify("1234"));
        assert!(!cred.verify("1235"));
        assert!(!cred.verify(""));
    }

    #[test]
    fn test_fresh_salt_per_issue() {
        let a = PinCredential::issue("1234");
        let b = PinCredential::issue("1234");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.digest, b.digest);
        assert!(a.verify("1234"));
        assert!(b.verify("1234"));
    }

    #[test]
    fn test_digest_is_stable_for_a_salt() {
        assert_eq!(hash_pin("1234", "abc"), hash_pin("1234", "abc"));
        assert_ne!(hash_pin("1234", "abc"), hash_pin("1234", "abd"));
    }

    #[test]
    fn test_admin_auth() {
        let auth = AdminAuth::new("s3cret");
        assert!(auth.verify("s3cret"));
        assert!(!auth.verify("guess"));
    }
}
