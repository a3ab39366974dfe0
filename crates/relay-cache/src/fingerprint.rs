//! Request fingerprints.
//!
//! A fingerprint is a stable SHA-256 over the normalized messages, the
//! chosen model, and bucketed sampling parameters. Two requests with equal
//! fingerprints are eligible to share a cached response.

use relay_core::{ChatMessage, ModelId};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version tag mixed into every fingerprint. Bump to invalidate the cache
/// when the normalization rules change.
const FINGERPRINT_VERSION: &str = "v1";

/// Width of a temperature bucket.
const TEMPERATURE_BUCKET: f32 = 0.1;

/// Width of a max-tokens bucket.
const MAX_TOKENS_BUCKET: u32 = 256;

/// A deterministic cache key for one request shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a normalized request.
    #[must_use]
    pub fn compute(
        messages: &[ChatMessage],
        model: &ModelId,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION.as_bytes());
        hasher.update([0x1f]);
        hasher.update(model.as_str().as_bytes());
        hasher.update([0x1f]);

        for message in messages {
            hasher.update(message.role.to_string().as_bytes());
            hasher.update([0x1e]);
            hasher.update(message.content.trim().as_bytes());
            if let Some(ref name) = message.name {
                hasher.update([0x1e]);
                hasher.update(name.trim().as_bytes());
            }
            hasher.update([0x1f]);
        }

        hasher.update(temperature_bucket(temperature).to_be_bytes());
        hasher.update(max_tokens_bucket(max_tokens).to_be_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    /// The fingerprint as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn temperature_bucket(temperature: Option<f32>) -> i32 {
    match temperature {
        Some(t) => (t / TEMPERATURE_BUCKET).round() as i32,
        None => -1,
    }
}

fn max_tokens_bucket(max_tokens: Option<u32>) -> u32 {
    match max_tokens {
        Some(m) => m.div_ceil(MAX_TOKENS_BUCKET),
        None => 0,
    }
}
