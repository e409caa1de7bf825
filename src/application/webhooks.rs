//! Outbound webhook delivery.
//!
//! Every payload is signed with the connection's shared secret:
//! `X-Sitemend-Signature: sha256=<hex hmac of the raw body>`. Delivery is
//! best-effort; a failed POST is logged and never fails the operation that
//! produced the event.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::entities::ConnectionRecord;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-sitemend-signature";

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a received `sha256=<hex>` signature header.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_sig) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_sig) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.ct_eq(provided.as_slice()).unwrap_u8() == 1
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum WebhookEvent {
    #[serde(rename = "scan.completed")]
    ScanCompleted {
        connection_id: Uuid,
        pages_scanned: u32,
        images_found: u32,
        images_missing_alt: u32,
    },
    #[serde(rename = "batch.completed")]
    BatchCompleted {
        connection_id: Uuid,
        batch_id: Uuid,
        processed: u32,
        optimized: u32,
        failed: u32,
    },
    #[serde(rename = "fix.applied")]
    FixApplied {
        connection_id: Uuid,
        applied: u32,
        failed: u32,
    },
}

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: std::time::Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitemend/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Deliver one event to the connection's endpoint, when one is set.
    pub async fn notify(&self, connection: &ConnectionRecord, event: &WebhookEvent) {
        let Some(url) = connection.webhook_url.as_deref() else {
            return;
        };
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(err) => {
                warn!(connection_id = %connection.id, error = %err, "webhook payload serialization failed");
                return;
            }
        };

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json");
        if let Some(secret) = connection.webhook_secret.as_deref() {
            let signature = format!("sha256={}", sign(secret, &body));
            request = request.header(SIGNATURE_HEADER, signature);
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                metrics::counter!("sitemend_webhooks_delivered_total").increment(1);
                debug!(connection_id = %connection.id, "webhook delivered");
            }
            Ok(response) => {
                metrics::counter!("sitemend_webhooks_failed_total").increment(1);
                warn!(
                    connection_id = %connection.id,
                    status = response.status().as_u16(),
                    "webhook endpoint rejected delivery"
                );
            }
            Err(err) => {
                metrics::counter!("sitemend_webhooks_failed_total").increment(1);
                warn!(connection_id = %connection.id, error = %err, "webhook delivery failed");
            }
        }
    }
}
