use tokio::task::JoinHandle;

use crate::{
    config::Config,
    error::GatewayError,
    media::MediaCollection,
    photo_source::{self, MediaContent, PhotoSource},
};

/// Facade over the active photo provider. Selection happens once, at
/// construction, from the validated configuration; callers only ever see the
/// uniform two-operation contract.
pub struct PhotoGateway {
    source: Box<dyn PhotoSource>,
}

impl PhotoGateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let source = photo_source::from_config(config)?;
        Ok(PhotoGateway { source })
    }

    #[cfg(test)]
    pub(crate) fn with_source(source: Box<dyn PhotoSource>) -> Self {
        PhotoGateway { source }
    }

    pub async fn fetch_photos(&self) -> Result<MediaCollection, GatewayError> {
        self.source.fetch_photos().await
    }

    pub async fn fetch_image(&self, id: &str) -> Result<MediaContent, GatewayError> {
        if id.trim().is_empty() {
            return Err(GatewayError::Validation(
                "media identifier must not be empty".into(),
            ));
        }
        self.source.fetch_image(id).await
    }

    /// Start the active provider's cache sweepers; the process owns the
    /// handles and aborts them at shutdown.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        self.source.spawn_sweepers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiSource;
    use crate::media::MediaItem;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct StubSource;

    #[async_trait]
    impl PhotoSource for StubSource {
        async fn fetch_photos(&self) -> Result<MediaCollection, GatewayError> {
            Ok(MediaCollection {
                items: vec![MediaItem {
                    id: "one".into(),
                    name: "one.jpg".into(),
                    coordinates: [0.0, 0.0],
                    taken_at: String::new(),
                    mime_type: None,
                    url: "/media/one".into(),
                    signed_url: None,
                    geo_location: None,
                }],
            })
        }

        async fn fetch_image(&self, id: &str) -> Result<MediaContent, GatewayError> {
            Ok(MediaContent {
                data: Bytes::from(id.to_string()),
                mime_type: None,
            })
        }

        fn spawn_sweepers(&self) -> Vec<tokio::task::JoinHandle<()>> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn facade_delegates_to_the_selected_source() {
        let gateway = PhotoGateway::with_source(Box::new(StubSource));
        assert_eq!(gateway.fetch_photos().await.unwrap().items.len(), 1);
        assert_eq!(
            gateway.fetch_image("one").await.unwrap().data,
            Bytes::from("one")
        );
    }

    #[tokio::test]
    async fn empty_identifier_is_rejected_before_the_provider_runs() {
        let gateway = PhotoGateway::with_source(Box::new(StubSource));
        assert!(matches!(
            gateway.fetch_image("  ").await,
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn unknown_source_never_reaches_construction() {
        // fail-fast lives in ApiSource parsing
        assert!(matches!(
            "imgur".parse::<ApiSource>(),
            Err(GatewayError::Validation(_))
        ));
    }
}
