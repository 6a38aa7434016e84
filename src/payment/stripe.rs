//! Stripe PaymentIntents over the REST API (form-encoded, basic auth).

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{GatewayError, PaymentGateway, PaymentIntent};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(http: reqwest::Client, secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self { http, secret_key: secret_key.into(), api_base: api_base.into().trim_end_matches('/').to_string() }
    }

    async fn decode(resp: reqwest::Response) -> Result<PaymentIntent, GatewayError> {
        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            return Err(GatewayError::Rejected { status: status.as_u16(), message });
        }
        serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn create_intent(&self, amount_minor: i64, currency: &str) -> Result<PaymentIntent, GatewayError> {
        let amount = amount_minor.to_string();
        let resp = self.http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("automatic_payment_methods[enabled]", "true"),
            ])
            .send()
            .await?;
        let intent = Self::decode(resp).await?;
        debug!(intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let resp = self.http
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        Self::decode(resp).await
    }
}
