//! Vision model client.
//!
//! The wire contract with the vision endpoint is fixed: the request carries
//! the image inline as base64 plus page context, and the response is the
//! camelCase suggestion object. Anything outside that shape is a protocol
//! error, not a retryable transport failure.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image download failed: {0}")]
    Download(String),
    #[error("vision request failed: {0}")]
    Request(String),
    #[error("vision endpoint returned status {0}")]
    Status(u16),
    #[error("malformed suggestion payload: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub image_url: String,
    pub page_url: String,
    pub format: Option<String>,
}

/// The suggestion object the endpoint must return, verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionSuggestion {
    pub alt_text: String,
    pub description: String,
    /// 0..=100 model self-assessment.
    pub confidence: i16,
    pub tags: Vec<String>,
    pub is_product_image: bool,
}

impl VisionSuggestion {
    pub fn validate(self) -> Result<Self, VisionError> {
        if !(0..=100).contains(&self.confidence) {
            return Err(VisionError::Protocol(format!(
                "confidence {} outside 0..=100",
                self.confidence
            )));
        }
        if self.alt_text.trim().is_empty() {
            return Err(VisionError::Protocol("empty altText".into()));
        }
        Ok(self)
    }
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn suggest(&self, request: &VisionRequest) -> Result<VisionSuggestion, VisionError>;
}

/// Instruction sent alongside every image. The `{page_url}` placeholder is
/// filled per request so the model sees the page the image appears on.
const PROMPT_TEMPLATE: &str = "\
You are an accessibility assistant writing SEO-friendly alt text for an \
image published on {page_url}. Respond with a single JSON object with the \
fields altText (a concise description, at most 125 characters), description \
(a longer caption), confidence (an integer from 0 to 100), tags (an array \
of short keywords), and isProductImage (a boolean). Describe only what is \
visible in the image.";

fn render_prompt(page_url: &str) -> String {
    PROMPT_TEMPLATE.replace("{page_url}", page_url)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VisionApiRequest<'a> {
    image_base64: String,
    image_format: Option<&'a str>,
    page_url: &'a str,
    prompt: String,
}

/// HTTP-backed client. Downloads the image, inlines it as base64, and posts
/// it to the configured endpoint with a bearer key.
pub struct HttpVisionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpVisionClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        timeout: std::time::Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitemend/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    async fn download(&self, url: &str) -> Result<bytes::Bytes, VisionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VisionError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VisionError::Download(format!(
                "status {}",
                response.status().as_u16()
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| VisionError::Download(e.to_string()))
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn suggest(&self, request: &VisionRequest) -> Result<VisionSuggestion, VisionError> {
        let bytes = self.download(&request.image_url).await?;
        debug!(image = %request.image_url, size = bytes.len(), "image downloaded for analysis");

        let body = VisionApiRequest {
            image_base64: BASE64.encode(&bytes),
            image_format: request.format.as_deref(),
            page_url: &request.page_url,
            prompt: render_prompt(&request.page_url),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Status(status.as_u16()));
        }

        let suggestion: VisionSuggestion = response
            .json()
            .await
            .map_err(|e| VisionError::Protocol(e.to_string()))?;
        suggestion.validate()
    }
}
