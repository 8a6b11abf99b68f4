use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use log::{debug, info, warn};
use reqwest::{header::HeaderMap, redirect, StatusCode};
use tokio::task::JoinHandle;

use crate::{
    cache::BoundedTtlCache,
    config::{
        Config, SIGNED_URL_CACHE_CAPACITY, SIGNED_URL_SWEEP_INTERVAL, SIGNED_URL_TTL,
    },
    error::GatewayError,
    json_templates::ListedMedia,
    media::{MediaCollection, MediaItem},
    photo_source::{MediaContent, PhotoSource},
    retry::{retry_with_backoff, RetryPolicy},
};

const SOURCE: &str = "media api";

/// A provider-issued temporary URL plus diagnostic metadata from the
/// resolving response.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub geo_location: Option<String>,
    pub request_id: Option<String>,
}

/// The wire calls behind the media API. A trait seam so the caching and
/// expiry-recovery flows can be exercised without the network.
#[async_trait]
pub(crate) trait MediaApiTransport: Send + Sync {
    /// Fetch the full listing from the authenticated JSON endpoint.
    async fn list(&self) -> Result<Vec<ListedMedia>, GatewayError>;

    /// Resolve a file name to its signed URL by following the API's
    /// redirect-style response by hand. Never consults any cache.
    async fn resolve(&self, file_name: &str) -> Result<SignedUrl, GatewayError>;

    /// Plain GET of a pre-authenticated URL. Any HTTP response comes back as
    /// status plus body so the caller can classify it; only transport-level
    /// failures are errors.
    async fn download(&self, url: &str) -> Result<(StatusCode, Bytes), GatewayError>;
}

/// The real transport: an authenticated listing endpoint plus an image
/// endpoint answering with a 302 whose target is a short-lived
/// pre-authenticated URL.
struct HttpTransport {
    /// Redirects stay manual so the 302 Location can be captured.
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    fn request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

#[async_trait]
impl MediaApiTransport for HttpTransport {
    async fn list(&self) -> Result<Vec<ListedMedia>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/images/list", self.base_url))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(GatewayError::Authentication { upstream: SOURCE });
            }
            let request_id = Self::request_id(response.headers());
            return Err(GatewayError::network(
                SOURCE,
                format!("listing failed with {status} (request id {request_id:?})"),
            ));
        }

        Ok(response.json().await?)
    }

    async fn resolve(&self, file_name: &str) -> Result<SignedUrl, GatewayError> {
        let response = self
            .client
            .get(format!("{}/image", self.base_url))
            .query(&[("fileName", file_name)])
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(GatewayError::Authentication { upstream: SOURCE })
            }
            StatusCode::NOT_FOUND => return Err(GatewayError::NotFound { upstream: SOURCE }),
            StatusCode::FOUND => {}
            other => {
                let request_id = Self::request_id(response.headers());
                return Err(GatewayError::network(
                    SOURCE,
                    format!("expected redirect, got {other} (request id {request_id:?})"),
                ));
            }
        }

        let headers = response.headers();
        let url = headers
            .get("Location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::network(SOURCE, "no redirect url provided"))?;

        let signed = SignedUrl {
            url,
            geo_location: headers
                .get("X-Geo-Location")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            request_id: Self::request_id(headers),
        };

        debug!(
            "[media api] resolved signed url for {file_name} (request id {:?})",
            signed.request_id
        );
        Ok(signed)
    }

    async fn download(&self, url: &str) -> Result<(StatusCode, Bytes), GatewayError> {
        // signed urls are pre-authenticated, no headers needed
        let response = self.client.get(url).send().await?;
        let status = response.status();
        Ok((status, response.bytes().await?))
    }
}

/// Photo source backed by the signed-URL media API.
pub struct MediaApiPhotoSource {
    transport: Box<dyn MediaApiTransport>,
    policy: RetryPolicy,
    signed_url_cache: Arc<BoundedTtlCache<SignedUrl>>,
}

impl MediaApiPhotoSource {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let base_url = config
            .media_api_url
            .clone()
            .ok_or_else(|| GatewayError::Validation("MEDIA_API_URL is not set".into()))?;
        let api_key = config
            .media_api_key
            .clone()
            .ok_or_else(|| GatewayError::Validation("MEDIA_API_KEY is not set".into()))?;

        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self::with_transport(Box::new(HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })))
    }

    pub(crate) fn with_transport(transport: Box<dyn MediaApiTransport>) -> Self {
        MediaApiPhotoSource {
            transport,
            policy: RetryPolicy::default(),
            signed_url_cache: BoundedTtlCache::new("signed url cache", SIGNED_URL_CACHE_CAPACITY),
        }
    }

    /// Resolve the signed URL for a file, consulting the 14-minute cache
    /// first.
    pub async fn signed_url(&self, file_name: &str) -> Result<SignedUrl, GatewayError> {
        retry_with_backoff(self.policy, || self.resolve_signed_url(file_name)).await
    }

    async fn resolve_signed_url(&self, file_name: &str) -> Result<SignedUrl, GatewayError> {
        if let Some(cached) = self.signed_url_cache.get(file_name).await {
            return Ok(cached);
        }

        let signed = self.transport.resolve(file_name).await?;
        self.signed_url_cache
            .set(file_name, signed.clone(), SIGNED_URL_TTL)
            .await;
        Ok(signed)
    }

    async fn fetch_image_once(&self, file_name: &str) -> Result<MediaContent, GatewayError> {
        let signed = self.signed_url(file_name).await?;
        let (status, data) = self.transport.download(&signed.url).await?;

        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            // Expiry-shaped failure: every cached URL from the same issuance
            // window is suspect, so drop them all and let the retry resolve
            // a fresh one.
            warn!("[media api] signed url rejected for {file_name}, clearing cache");
            self.signed_url_cache.clear().await;
            return Err(GatewayError::network(SOURCE, "signed url expired"));
        }
        if !status.is_success() {
            return Err(GatewayError::network(
                SOURCE,
                format!("signed url fetch failed with {status}"),
            ));
        }

        Ok(MediaContent {
            data,
            mime_type: None,
        })
    }
}

/// Keep listings with parseable numeric coordinates, newest first by the
/// provider-supplied formatted date.
pub(crate) fn order_listing(listing: Vec<ListedMedia>) -> Vec<ListedMedia> {
    let mut located: Vec<ListedMedia> = listing
        .into_iter()
        .filter(|media| media.parsed_coordinates().is_some())
        .collect();

    located.sort_by(|a, b| {
        let a_time = a
            .formatted_date
            .as_deref()
            .and_then(crate::media::parse_capture_time);
        let b_time = b
            .formatted_date
            .as_deref()
            .and_then(crate::media::parse_capture_time);
        b_time.cmp(&a_time)
    });

    located
}

#[async_trait]
impl PhotoSource for MediaApiPhotoSource {
    async fn fetch_photos(&self) -> Result<MediaCollection, GatewayError> {
        let listing = retry_with_backoff(self.policy, || self.transport.list()).await?;
        let located = order_listing(listing);

        // Resolve signed urls for the whole listing in parallel; each
        // resolution carries its own retry budget.
        let resolutions = join_all(
            located
                .iter()
                .map(|media| self.signed_url(&media.file_name)),
        )
        .await;

        let mut items = Vec::with_capacity(located.len());
        for (media, resolution) in located.into_iter().zip(resolutions) {
            let signed = resolution?;
            let (lng, lat) = match media.parsed_coordinates() {
                Some(coords) => coords,
                None => continue,
            };
            let mime_type = media.content_type.clone().unwrap_or_default();
            items.push(MediaItem {
                id: media.file_name.clone(),
                url: format!(
                    "/media/{}?fileName={}&mimeType={}",
                    media.file_name, media.file_name, mime_type
                ),
                name: media.file_name,
                coordinates: [lng, lat],
                taken_at: media.formatted_date.unwrap_or_default(),
                mime_type: media.content_type,
                signed_url: Some(signed.url),
                geo_location: signed.geo_location.or(media.geo_location),
            });
        }

        info!("[media api] listed {} geolocated items", items.len());
        Ok(MediaCollection { items })
    }

    async fn fetch_image(&self, id: &str) -> Result<MediaContent, GatewayError> {
        retry_with_backoff(self.policy, || self.fetch_image_once(id)).await
    }

    fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        vec![self
            .signed_url_cache
            .spawn_sweeper(SIGNED_URL_SWEEP_INTERVAL)]
    }
}
