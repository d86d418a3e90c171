//! Request/response signing for the hosted payment platform.
//!
//! The platform signs the flat field set by sorting every `vads_`-prefixed field
//! by name, joining the values with `+`, appending the shop secret and hashing
//! the result. The same canonical string is used in both directions: outbound
//! when building the payment form and inbound when authenticating a callback.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::collections::HashMap;

/// Reserved prefix carried by every platform field.
pub const FIELD_PREFIX: &str = "vads_";

/// Name of the signature field attached to requests and responses.
pub const SIGNATURE_FIELD: &str = "signature";

/// Field announcing the hash algorithm on newer-generation callbacks.
pub const ALGORITHM_FIELD: &str = "vads_hash_algorithm";

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm negotiated with the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignAlgorithm {
    /// Legacy plain SHA-1 over the canonical string, hex encoded.
    Sha1,
    /// HMAC-SHA-256 keyed with the shop secret, base64 encoded.
    HmacSha256,
}

impl SignAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignAlgorithm::Sha1 => "SHA-1",
            SignAlgorithm::HmacSha256 => "HMAC-SHA-256",
        }
    }

    /// Resolve the algorithm announced by a callback payload. The legacy
    /// generation does not send the field at all.
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some("HMAC-SHA-256") => SignAlgorithm::HmacSha256,
            _ => SignAlgorithm::Sha1,
        }
    }
}

impl std::fmt::Display for SignAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the canonical string signed by both sides: values of the reserved
/// fields in byte-wise ascending key order, `+`-joined, secret appended.
/// The ordering is locale-independent by construction.
pub fn canonical_content(fields: &HashMap<String, String>, secret: &str) -> String {
    let mut keys: Vec<&String> = fields
        .keys()
        .filter(|k| k.starts_with(FIELD_PREFIX))
        .collect();
    keys.sort_unstable();

    let mut content = String::new();
    for key in keys {
        if let Some(value) = fields.get(key.as_str()) {
            content.push_str(value);
            content.push('+');
        }
    }
    content.push_str(secret);
    content
}

/// Compute the signature to attach to an outbound field set, or the expected
/// signature of an inbound one. The secret itself is never logged.
pub fn sign(fields: &HashMap<String, String>, secret: &str, algorithm: SignAlgorithm) -> String {
    let content = canonical_content(fields, secret);
    match algorithm {
        SignAlgorithm::Sha1 => hex::encode(Sha1::digest(content.as_bytes())),
        SignAlgorithm::HmacSha256 => {
            let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
                Ok(mac) => mac,
                // HMAC accepts keys of any length; unreachable in practice.
                Err(_) => return String::new(),
            };
            mac.update(content.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        }
    }
}

/// Verify an inbound signature. Returns false on any failure and never errors:
/// a false result means no other field in the payload can be trusted.
pub fn verify(
    fields: &HashMap<String, String>,
    received: &str,
    secret: &str,
    algorithm: SignAlgorithm,
) -> bool {
    if received.trim().is_empty() {
        return false;
    }
    let expected = sign(fields, secret, algorithm);
    secure_eq(expected.as_bytes(), received.trim().as_bytes())
}

/// Constant-time byte comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
