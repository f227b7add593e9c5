//! Payment checkout.
//!
//! [`CheckoutGateway`] creates hosted checkout sessions; the Stripe adapter
//! lives in [`stripe`] and [`FakeCheckoutGateway`] stands in when no secret
//! key is configured. [`WebhookVerifier`] authenticates the gateway's
//! completion callbacks.

mod stripe;
mod webhook;

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use stripe::StripeCheckoutGateway;
pub use webhook::{SIGNATURE_HEADER, WebhookEvent, WebhookVerifier};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Signature(String),

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway rejected request ({status}): {message}")]
    Gateway { status: u16, message: String },
}

/// One card payment for a single tour.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub tour_id: String,
    pub tour_name: String,
    pub tour_summary: String,
    pub image_url: String,
    /// Price in currency units; sent to the gateway in cents.
    pub price: f64,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub fn unit_amount(&self) -> i64 {
        (self.price * 100.0).round() as i64
    }
}

/// The gateway's view of a session, as returned on creation and in webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_reference_id: Option<String>,
    /// Amount in cents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<i64>,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError>;
}

/// Answers every request with a synthetic session and remembers the request.
#[derive(Debug, Default)]
pub struct FakeCheckoutGateway {
    requests: RwLock<Vec<CheckoutRequest>>,
}

impl FakeCheckoutGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CheckoutGateway for FakeCheckoutGateway {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        let id = format!("cs_test_{}", uuid::Uuid::now_v7().simple());
        let session = CheckoutSession {
            url: Some(format!("{}#{id}", request.success_url)),
            customer_email: Some(request.customer_email.clone()),
            client_reference_id: Some(request.tour_id.clone()),
            amount_total: Some(request.unit_amount()),
            id,
        };
        self.requests
            .write()
            .map_err(|_| CheckoutError::Transport("fake gateway lock poisoned".to_string()))?
            .push(request);
        Ok(session)
    }
}
