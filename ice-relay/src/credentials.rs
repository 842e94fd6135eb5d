//! TURN long-term credential handling
//!
//! Allocate requests authenticate with the long-term credential mechanism:
//! the key is MD5 over `username:realm:password` and MESSAGE-INTEGRITY is
//! HMAC-SHA1 over the message keyed with that key. The gateway issues its
//! own relay credentials, so the default hasher reuses the username as the
//! password source; clients are expected to present credentials the
//! gateway provisioned the same way.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Derived long-term credential key
pub type CredentialKey = [u8; 16];

/// Credential hook consulted for every TURN Allocate request
///
/// Implementations must be reentrant and side-effect free; the relay
/// calls them concurrently per request.
pub trait TurnAuthHandler: Send + Sync {
    /// Compute the long-term credential key for `username` in `realm`
    ///
    /// Returns `None` when the username is unknown, which fails the
    /// allocation with a 401.
    fn compute_key(&self, username: &str, realm: &str) -> Option<CredentialKey>;
}

/// Default credential hasher: the username doubles as the password
///
/// Self-provisioned relay credentials issued by the gateway itself, not a
/// client-supplied secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfProvisionedAuth;

impl TurnAuthHandler for SelfProvisionedAuth {
    fn compute_key(&self, username: &str, realm: &str) -> Option<CredentialKey> {
        Some(long_term_credential_key(username, realm, username))
    }
}

/// MD5 of `username:realm:password`, the long-term credential key
pub fn long_term_credential_key(username: &str, realm: &str, password: &str) -> CredentialKey {
    let mut hasher = Md5::new();
    hasher.update(format!("{}:{}:{}", username, realm, password).as_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest);
    key
}

/// HMAC-SHA1 over `input` keyed with a credential key
pub fn message_integrity(key: &CredentialKey, input: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(input);

    let mut out = [0u8; 20];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Constant-shape comparison of a received MESSAGE-INTEGRITY value
pub fn verify_integrity(key: &CredentialKey, input: &[u8], received: &[u8]) -> bool {
    if received.len() != 20 {
        return false;
    }
    let expected = message_integrity(key, input);
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(received.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let auth = SelfProvisionedAuth;
        let first = auth.compute_key("alice", "realm.com").unwrap();
        let second = auth.compute_key("alice", "realm.com").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_key_differs_per_realm() {
        let auth = SelfProvisionedAuth;
        let a = auth.compute_key("alice", "realm.com").unwrap();
        let b = auth.compute_key("alice", "other.org").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_matches_md5_reference() {
        // MD5("user:realm:pass") per RFC 5389 section 15.4.
        let key = long_term_credential_key("user", "realm", "pass");
        assert_eq!(
            key,
            [
                0x84, 0x93, 0xfb, 0xc5, 0x3b, 0xa5, 0x82, 0xfb,
                0x4c, 0x04, 0x4c, 0x45, 0x6b, 0xdc, 0x40, 0xeb,
            ]
        );
    }

    #[test]
    fn test_integrity_round_trip() {
        let key = long_term_credential_key("alice", "realm.com", "alice");
        let payload = b"arbitrary message bytes";
        let mac = message_integrity(&key, payload);
        assert!(verify_integrity(&key, payload, &mac));
        assert!(!verify_integrity(&key, b"tampered message bytes", &mac));
        assert!(!verify_integrity(&key, payload, &mac[..19]));
    }
}
