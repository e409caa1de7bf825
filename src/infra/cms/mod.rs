//! Platform adapters behind the [`CmsGateway`] seam.

mod shopify;
mod wordpress;

use async_trait::async_trait;

use crate::application::fixes::{CmsError, CmsGateway};
use crate::domain::entities::{ConnectionRecord, ImageAssetRecord};
use crate::domain::types::Platform;

pub use shopify::ShopifyClient;
pub use wordpress::WordpressClient;

/// Routes each write to the adapter for the connection's platform.
pub struct CmsRouter {
    shopify: ShopifyClient,
    wordpress: WordpressClient,
}

impl CmsRouter {
    pub fn new(timeout: std::time::Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitemend/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            shopify: ShopifyClient::new(client.clone()),
            wordpress: WordpressClient::new(client),
        })
    }
}

#[async_trait]
impl CmsGateway for CmsRouter {
    async fn write_alt_text(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
        alt_text: Option<&str>,
    ) -> Result<(), CmsError> {
        match connection.platform {
            Platform::Shopify => self.shopify.set_alt_text(connection, asset, alt_text).await,
            Platform::Wordpress => {
                self.wordpress
                    .set_alt_text(connection, asset, alt_text)
                    .await
            }
        }
    }

    async fn resolve_media_id(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<Option<String>, CmsError> {
        match connection.platform {
            Platform::Shopify => self.shopify.lookup_media_id(connection, asset).await,
            Platform::Wordpress => self.wordpress.lookup_media_id(connection, asset).await,
        }
    }
}
