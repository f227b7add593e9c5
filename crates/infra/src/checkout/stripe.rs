//! Reqwest-backed Stripe Checkout adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{CheckoutError, CheckoutGateway, CheckoutRequest, CheckoutSession};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Creates sessions through `POST /v1/checkout/sessions`.
pub struct StripeCheckoutGateway {
    client: Client,
    endpoint: Url,
    secret_key: String,
}

impl std::fmt::Debug for StripeCheckoutGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeCheckoutGateway")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl StripeCheckoutGateway {
    pub fn new(secret_key: impl Into<String>, timeout: Duration) -> Result<Self, CheckoutError> {
        Self::with_api_base(secret_key, DEFAULT_API_BASE, timeout)
    }

    /// Point the adapter at another API host (a local mock, for instance).
    pub fn with_api_base(
        secret_key: impl Into<String>,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, CheckoutError> {
        let endpoint = Url::parse(api_base)
            .and_then(|base| base.join("/v1/checkout/sessions"))
            .map_err(|e| CheckoutError::Transport(format!("invalid API base {api_base}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            secret_key: secret_key.into(),
        })
    }
}

/// Stripe's bracketed form encoding of a one-item card payment.
pub(crate) fn session_form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    vec![
        ("payment_method_types[0]", "card".to_string()),
        ("mode", "payment".to_string()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("customer_email", request.customer_email.clone()),
        ("client_reference_id", request.tour_id.clone()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", "usd".to_string()),
        ("line_items[0][price_data][unit_amount]", request.unit_amount().to_string()),
        (
            "line_items[0][price_data][product_data][name]",
            format!("{} tour", request.tour_name),
        ),
        (
            "line_items[0][price_data][product_data][description]",
            request.tour_summary.clone(),
        ),
        (
            "line_items[0][price_data][product_data][images][0]",
            request.image_url.clone(),
        ),
    ]
}

#[async_trait]
impl CheckoutGateway for StripeCheckoutGateway {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.secret_key)
            .form(&session_form(&request))
            .send()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            tracing::warn!(status = status.as_u16(), %message, "checkout session rejected");
            return Err(CheckoutError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession =
            serde_json::from_slice(&body).map_err(|e| CheckoutError::Payload(e.to_string()))?;
        tracing::info!(session = %session.id, tour = %request.tour_id, "checkout session created");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::tests::request;

    #[test]
    fn form_describes_one_card_payment_in_cents() {
        let form = session_form(&request(397.0));
        let get = |key: &str| form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());

        assert_eq!(get("payment_method_types[0]"), Some("card"));
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("39700"));
        assert_eq!(get("line_items[0][quantity]"), Some("1"));
        assert_eq!(get("client_reference_id"), Some("0190a1b2-0000-7000-8000-000000000001"));
        assert_eq!(get("customer_email"), Some("laura@example.com"));
        assert_eq!(
            get("line_items[0][price_data][product_data][name]"),
            Some("The Forest Hiker tour")
        );
    }

    #[test]
    fn endpoint_joins_the_api_base() {
        let gateway =
            StripeCheckoutGateway::with_api_base("sk_test", "http://127.0.0.1:9999", Duration::from_secs(5))
                .unwrap();
        assert_eq!(gateway.endpoint.as_str(), "http://127.0.0.1:9999/v1/checkout/sessions");
    }
}
