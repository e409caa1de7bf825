//! Shopify Admin API adapter.
//!
//! Alt text lives on the file object, updated through the `fileUpdate`
//! GraphQL mutation. The asset must carry the platform media id captured
//! during sync; without it there is nothing addressable to update.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::application::fixes::CmsError;
use crate::domain::entities::{ConnectionRecord, ImageAssetRecord};

const API_VERSION: &str = "2024-10";

const FILE_UPDATE_MUTATION: &str = "\
mutation fileUpdate($files: [FileUpdateInput!]!) { \
  fileUpdate(files: $files) { \
    files { id } \
    userErrors { field message } \
  } \
}";

const FILE_SEARCH_QUERY: &str = "\
query fileSearch($query: String!) { \
  files(first: 1, query: $query) { \
    nodes { id } \
  } \
}";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<FileUpdateData>,
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FileUpdateData {
    #[serde(rename = "fileUpdate")]
    file_update: Option<FileUpdatePayload>,
}

#[derive(Debug, Deserialize)]
struct FileUpdatePayload {
    #[serde(rename = "userErrors")]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<SearchData>,
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    files: Option<FileNodes>,
}

#[derive(Debug, Deserialize)]
struct FileNodes {
    nodes: Vec<FileNode>,
}

#[derive(Debug, Deserialize)]
struct FileNode {
    id: String,
}

pub struct ShopifyClient {
    client: reqwest::Client,
}

impl ShopifyClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn endpoint(domain: &str) -> String {
        format!("https://{domain}/admin/api/{API_VERSION}/graphql.json")
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

        let body = json!({
            "query": FILE_UPDATE_MUTATION,
            "variables": {
                "files": [{ "id": media_id, "alt": alt_text.unwrap_or("") }]
            }
        });

        let response = self
            .client
            .post(Self::endpoint(&connection.domain))
            .header("X-Shopify-Access-Token", &connection.api_credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status(status.as_u16()));
        }

        let parsed: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;
        if let Some(errors) = parsed.errors {
            return Err(CmsError::Request(errors.to_string()));
        }
        if let Some(payload) = parsed.data.and_then(|d| d.file_update)
            && let Some(first) = payload.user_errors.first()
        {
            return Err(CmsError::Request(first.message.clone()));
        }

        debug!(media_id, "shopify alt text updated");
        Ok(())
    }

    /// Search the file library for the asset's media by filename.
    pub async fn lookup_media_id(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<Option<String>, CmsError> {
        let Some(filename) = filename_of(&asset.url) else {
            return Ok(None);
        };

        let body = json!({
            "query": FILE_SEARCH_QUERY,
            "variables": { "query": format!("media_type:IMAGE filename:{filename}") }
        });

        let response = self
            .client
            .post(Self::endpoint(&connection.domain))
            .header("X-Shopify-Access-Token", &connection.api_credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status(status.as_u16()));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CmsError::Request(e.to_string()))?;
        if let Some(errors) = parsed.errors {
            return Err(CmsError::Request(errors.to_string()));
        }

        Ok(parsed
            .data
            .and_then(|d| d.files)
            .and_then(|f| f.nodes.into_iter().next())
            .map(|node| node.id))
    }
}

/// Last path segment of the asset URL, query string stripped.
fn filename_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_drops_path_and_query() {
        assert_eq!(
            filename_of("https://cdn.shopify.com/s/files/mug.jpg?v=123"),
            Some("mug.jpg")
        );
        assert_eq!(filename_of("https://shop.example.com/"), None);
    }
}
