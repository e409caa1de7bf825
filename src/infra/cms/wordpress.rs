//! WordPress REST adapter.
//!
//! Alt text is a writable field on the media object; the credential is a
//! `user:application-password` pair sent as HTTP Basic auth.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::application::fixes::CmsError;
use crate::domain::entities::{ConnectionRecord, ImageAssetRecord};

#[derive(Debug, Deserialize)]
struct MediaItem {
    id: u64,
    source_url: String,
}

pub struct WordpressClient {
    client: reqwest::Client,
}

impl WordpressClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn media_endpoint(domain: &str, media_id: &str) -> String {
        format!("https://{domain}/wp-json/wp/v2/media/{media_id}")
    }

    fn search_endpoint(domain: &str) -> String {
        format!("https://{domain}/wp-json/wp/v2/media")
    }

    fn basic_auth(connection: &ConnectionRecord) -> String {
        format!(
            "Basic {}",
            BASE64.encode(connection.api_credential.as_bytes())
        )
    }

    pub async fn set_alt_text(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
        alt_text: Option<&str>,
    ) -> Result<(), CmsError> {
        let media_id = asset
            .platform_media_id
            .as_deref()
            .ok_or_else(|| CmsError::MediaNotFound(asset.url.clone()))?;

        let response = self
            .client
            .post(Self::media_endpoint(&connection.domain, media_id))
            .header("authorization", Self::basic_auth(connection))
            .json(&json!({ "alt_text": alt_text.unwrap_or("") }))
            .send()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CmsError::MediaNotFound(asset.url.clone()));
        }
        if !status.is_success() {
            return Err(CmsError::Status(status.as_u16()));
        }

        debug!(media_id, "wordpress alt text updated");
        Ok(())
    }

    /// Find the media library entry whose source URL matches the asset.
    /// The search term is the filename; the match is on the full URL.
    pub async fn lookup_media_id(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<Option<String>, CmsError> {
        let filename = asset
            .url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|s| !s.is_empty());
        let Some(filename) = filename else {
            return Ok(None);
        };

        let response = self
            .client
            .get(Self::search_endpoint(&connection.domain))
            .header("authorization", Self::basic_auth(connection))
            .query(&[("search", filename), ("per_page", "20")])
            .send()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status(status.as_u16()));
        }

        let items: Vec<MediaItem> = response
            .json()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;
        Ok(items
            .into_iter()
            .find(|item| item.source_url == asset.url)
            .map(|item| item.id.to_string()))
    }
}
