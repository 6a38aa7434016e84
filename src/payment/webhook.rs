//! Stripe webhook signatures and event envelopes.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

/// Events older (or newer) than this many seconds are refused.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    MalformedHeader,
    InvalidKey,
    InvalidHex,
    Mismatch,
    Expired,
}

impl std::error::Error for SignatureError {}
impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedHeader => write!(f, "Invalid Stripe-Signature header"),
            Self::InvalidKey => write!(f, "Webhook signing secret is unusable"),
            Self::InvalidHex => write!(f, "Invalid signature hex"),
            Self::Mismatch => write!(f, "Webhook signature mismatch"),
            Self::Expired => write!(f, "Webhook timestamp outside tolerance"),
        }
    }
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against the raw body.
///
/// Any one `v1` entry matching is enough; Stripe sends several while a secret is rotated.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::MalformedHeader)?;

    let mac = signed_mac(payload, secret, timestamp)?;

    let mut matched = false;
    let mut saw_hex = false;
    for sig in signatures {
        let Ok(bytes) = hex::decode(sig) else { continue };
        saw_hex = true;
        // verify_slice compares in constant time
        if mac.clone().verify_slice(&bytes).is_ok() {
            matched = true;
            break;
        }
    }
    if !saw_hex {
        return Err(SignatureError::InvalidHex);
    }
    if !matched {
        return Err(SignatureError::Mismatch);
    }
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Computes the header value Stripe would send for `payload` at `timestamp`.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let mac = signed_mac(payload, secret, &timestamp.to_string())?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: &str) -> Result<Hmac<Sha256>, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: Option<String>,
    pub object: Option<String>,
}

impl WebhookEvent {
    /// Intent id for `payment_intent.*` events.
    pub fn payment_intent_id(&self) -> Option<&str> {
        let obj = &self.data.object;
        match obj.object.as_deref() {
            Some("payment_intent") | None => obj.id.as_deref(),
            Some(_) => None,
        }
    }
}
