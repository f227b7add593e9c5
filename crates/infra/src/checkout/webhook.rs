//! Signed checkout callbacks.
//!
//! The gateway sends `stripe-signature: t=<unix>,v1=<hex>` where the
//! signature is HMAC-SHA256 over `"<t>.<raw body>"` keyed by the endpoint
//! secret. Timestamps older than the tolerance are rejected.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::{CheckoutError, CheckoutSession};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_TOLERANCE_SECS: i64 = 300;
const COMPLETED: &str = "checkout.session.completed";

/// A verified callback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl WebhookEvent {
    /// The session of a `checkout.session.completed` event.
    pub fn completed_session(&self) -> Result<Option<CheckoutSession>, CheckoutError> {
        if self.kind != COMPLETED {
            return Ok(None);
        }
        serde_json::from_value(self.data.object.clone())
            .map(Some)
            .map_err(|e| CheckoutError::Payload(e.to_string()))
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: Duration::seconds(DEFAULT_TOLERANCE_SECS),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Header value signing `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, CheckoutError> {
        let signature = hex::encode(self.mac(timestamp, payload)?.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={signature}"))
    }

    /// Authenticate `payload` against `header` and decode the event.
    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<WebhookEvent, CheckoutError> {
        let (timestamp, signatures) = parse_header(header)?;

        let expected = self.mac(timestamp, payload)?;
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(CheckoutError::Signature(
                "No signatures found matching the expected signature for payload".to_string(),
            ));
        }

        let age = now.timestamp() - timestamp;
        if age > self.tolerance.num_seconds() {
            return Err(CheckoutError::Signature("Timestamp outside the tolerance zone".to_string()));
        }

        serde_json::from_slice(payload).map_err(|e| CheckoutError::Payload(e.to_string()))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, CheckoutError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CheckoutError::Signature(format!("invalid webhook secret: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), CheckoutError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(CheckoutError::Signature(
            "Unable to extract timestamp and signatures from header".to_string(),
        )),
    }
}
