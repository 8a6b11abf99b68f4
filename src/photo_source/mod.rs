pub mod drive;
pub mod media_api;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::{
    config::{ApiSource, Config},
    error::GatewayError,
    media::MediaCollection,
};

/// Binary media content plus the MIME type it should be served as, when the
/// provider knows it.
#[derive(Debug, Clone)]
pub struct MediaContent {
    pub data: Bytes,
    pub mime_type: Option<String>,
}

/// The capability both upstream backends implement: list the geolocated
/// collection and fetch one item's bytes.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Fetch the full geolocated collection, newest first. Re-derived on
    /// every call; nothing is synced incrementally.
    async fn fetch_photos(&self) -> Result<MediaCollection, GatewayError>;

    /// Fetch media bytes by provider identifier (Drive file id, or media-API
    /// file name).
    async fn fetch_image(&self, id: &str) -> Result<MediaContent, GatewayError>;

    /// Start this provider's periodic cache sweepers. The caller owns the
    /// handles and aborts them at shutdown.
    fn spawn_sweepers(&self) -> Vec<JoinHandle<()>>;
}

/// Construct the provider named by the configuration. The config has already
/// validated that the chosen source's variables are present.
pub fn from_config(config: &Config) -> Result<Box<dyn PhotoSource>, GatewayError> {
    match config.api_source {
        ApiSource::Drive => Ok(Box::new(drive::DrivePhotoSource::new(config)?)),
        ApiSource::MediaApi => Ok(Box::new(media_api::MediaApiPhotoSource::new(config)?)),
    }
}
