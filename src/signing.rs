//! Webhook-style signatures for forwarded events.
//!
//! Forwarded requests carry three headers: `webhook-id` (UUIDv7),
//! `webhook-timestamp` (unix seconds) and `webhook-signature`. The signature
//! is `v1,` followed by the base64 HMAC-SHA256 of
//! `"{id}.{timestamp}.{payload}"`, keyed by the session secret.
//!
//! Secrets are `aha-whsec-` followed by 64 alphanumeric characters and live
//! only for one listen session.

// Rust guideline compliant 2026-02

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::{distr::Alphanumeric, Rng};
use sha2::Sha256;

use crate::constants::{SECRET_PREFIX, SECRET_RANDOM_LENGTH, SIGNATURE_VERSION};

type HmacSha256 = Hmac<Sha256>;

/// Headers derived for one forwarded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingSignature {
    /// UUIDv7 message id (`webhook-id`).
    pub message_id: String,
    /// Unix seconds (`webhook-timestamp`).
    pub timestamp: i64,
    /// `v1,<base64>` (`webhook-signature`).
    pub signature: String,
}

/// HMAC signer keyed by a shared session secret.
#[derive(Clone)]
pub struct Signer {
    secret: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    /// Create a signer for an existing secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Create a signer with a freshly generated secret.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(generate_secret())
    }

    /// The shared secret (shown to the user so their endpoint can verify).
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    fn mac(&self, message_id: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(message_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }

    /// Sign `payload` for the given message id and timestamp.
    ///
    /// Pure function of `(secret, message_id, timestamp, payload)`.
    #[must_use]
    pub fn sign(&self, message_id: &str, timestamp: i64, payload: &[u8]) -> String {
        let mac = self.mac(message_id, timestamp, payload);
        let digest = mac.finalize().into_bytes();
        format!("{SIGNATURE_VERSION},{}", BASE64.encode(digest))
    }

    /// Sign `payload` with a new message id and the current time.
    #[must_use]
    pub fn signature_for(&self, payload: &[u8]) -> ForwardingSignature {
        let message_id = new_message_id();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.sign(&message_id, timestamp, payload);
        ForwardingSignature {
            message_id,
            timestamp,
            signature,
        }
    }

    /// Check a `webhook-signature` header value.
    ///
    /// The header may hold several space-separated `version,signature`
    /// entries; any matching `v1` entry is accepted.
    #[must_use]
    pub fn verify(&self, message_id: &str, timestamp: i64, payload: &[u8], header: &str) -> bool {
        header.split_whitespace().any(|entry| {
            let Some((version, encoded)) = entry.split_once(',') else {
                return false;
            };
            if version != SIGNATURE_VERSION {
                return false;
            }
            let Ok(expected) = BASE64.decode(encoded) else {
                return false;
            };
            self.mac(message_id, timestamp, payload)
                .verify_slice(&expected)
                .is_ok()
        })
    }
}

/// Generate a session secret: `aha-whsec-` + 64 alphanumeric characters.
#[must_use]
pub fn generate_secret() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_RANDOM_LENGTH)
        .map(char::from)
        .collect();
    format!("{SECRET_PREFIX}{random}")
}

/// New time-ordered (UUIDv7) message id.
#[must_use]
pub fn new_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
