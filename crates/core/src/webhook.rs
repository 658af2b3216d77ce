//! Generation-result webhook payloads and HMAC signature checks.
//!
//! The generation service calls back once per task with audio and/or
//! lyrics. When a signing secret is configured, the raw body is signed with
//! HMAC-SHA256 and sent hex-encoded in [`SIGNATURE_HEADER`].

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Header carrying the hex HMAC of the request body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// One result delivery for a task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub task_id: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub lyrics: Option<String>,
    /// Provider-side status string, logged only.
    #[serde(default)]
    pub status: Option<String>,
}

impl GenerationResult {
    pub fn has_content(&self) -> bool {
        self.audio_url.is_some() || self.lyrics.is_some()
    }
}

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts any key length"),
    }
}

/// Compute the hex HMAC-SHA256 signature of `payload`.
pub fn compute_webhook_hmac(secret: &str, payload: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a hex signature against `payload` in constant time.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
            .collect()
    }
}
