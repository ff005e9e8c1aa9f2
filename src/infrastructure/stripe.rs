use crate::domain::clock::ClockRef;
use crate::domain::payment::{
    CHECKOUT_COMPLETED, CheckoutRequest, CheckoutSession, ProviderEvent, ProviderEventKind,
    PurchaseMetadata,
};
use crate::domain::ports::PaymentProvider;
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";
/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    pub timeout: Duration,
}

/// Stripe Checkout adapter.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    settings: StripeSettings,
    api_base: String,
    clock: ClockRef,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawCheckoutObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) for
/// `payload` signed with `secret`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<()> {
    if secret.is_empty() {
        return Err(MarketError::SignatureError(
            "webhook secret is not configured".to_string(),
        ));
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| {
        MarketError::SignatureError("signature header has no timestamp".to_string())
    })?;
    if signatures.is_empty() {
        return Err(MarketError::SignatureError(
            "signature header has no v1 signature".to_string(),
        ));
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(MarketError::SignatureError(
            "timestamp outside the tolerance window".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| MarketError::SignatureError(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(MarketError::SignatureError(
            "no signature matches the payload".to_string(),
        ))
    }
}

/// Decodes a verified event body.
pub fn parse_event(payload: &[u8]) -> Result<ProviderEvent> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| MarketError::ValidationError(format!("Malformed webhook event: {e}")))?;
    let kind = if raw.event_type == CHECKOUT_COMPLETED {
        let object: RawCheckoutObject = serde_json::from_value(raw.data.object).map_err(|e| {
            MarketError::ValidationError(format!("Malformed checkout session: {e}"))
        })?;
        ProviderEventKind::CheckoutCompleted {
            checkout_id: object.id,
            metadata: PurchaseMetadata::from_map(&object.metadata)?,
        }
    } else {
        ProviderEventKind::Other(raw.event_type)
    };
    Ok(ProviderEvent { id: raw.id, kind })
}

impl StripeClient {
    pub fn new(settings: StripeSettings, clock: ClockRef) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            settings,
            api_base: DEFAULT_API_BASE.to_string(),
            clock,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.settings.success_url.clone()),
            ("cancel_url".to_string(), self.settings.cancel_url.clone()),
            (
                "line_items[0][price_data][currency]".to_string(),
                "usd".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.product_name.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.unit_amount_cents.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        form.extend(
            request
                .metadata
                .to_pairs()
                .into_iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value)),
        );
        form
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.settings.secret_key)
            .form(&self.checkout_form(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "Stripe rejected checkout session");
            return Err(MarketError::Upstream(format!(
                "checkout session request failed with {status}"
            )));
        }
        let session: RawCheckoutSession = response.json().await?;
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<ProviderEvent> {
        verify_signature(
            payload,
            signature,
            &self.settings.webhook_secret,
            self.clock.now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )?;
        parse_event(payload)
    }
}
