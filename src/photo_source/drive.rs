use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::{
    cache::BoundedTtlCache,
    config::{Config, IMAGE_CACHE_CAPACITY, IMAGE_CACHE_SWEEP_INTERVAL, IMAGE_CACHE_TTL},
    error::GatewayError,
    imaging,
    json_templates::{DriveFile, DriveFileList, DriveFileMimeType},
    media::{format_capture_time, parse_capture_time, MediaCollection, MediaItem},
    photo_source::{MediaContent, PhotoSource},
    retry::{retry_with_backoff, RetryPolicy},
};

const SOURCE: &str = "google drive";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Photo source backed by a Google Drive folder, authenticated with an API
/// key. Fetched bytes are cached for a day; HEIC stills are transcoded to
/// JPEG on the way out.
pub struct DrivePhotoSource {
    client: reqwest::Client,
    api_key: String,
    folder_id: String,
    policy: RetryPolicy,
    image_cache: Arc<BoundedTtlCache<MediaContent>>,
}

impl DrivePhotoSource {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        // presence was validated with the rest of the config
        let api_key = config
            .google_api_key
            .clone()
            .ok_or_else(|| GatewayError::Validation("GOOGLE_API_KEY is not set".into()))?;
        let folder_id = config
            .google_folder_id
            .clone()
            .ok_or_else(|| GatewayError::Validation("GOOGLE_FOLDER_ID is not set".into()))?;

        Ok(DrivePhotoSource {
            client: reqwest::Client::new(),
            api_key,
            folder_id,
            policy: RetryPolicy::default(),
            image_cache: BoundedTtlCache::new("image cache", IMAGE_CACHE_CAPACITY),
        })
    }

    async fn list_once(&self) -> Result<Vec<DriveFile>, GatewayError> {
        let folder_query = format!("'{}' in parents", self.folder_id);
        let response = self
            .client
            .get(FILES_URL)
            .query(&[
                ("q", folder_query.as_str()),
                (
                    "fields",
                    "files(id,name,createdTime,imageMediaMetadata,videoMediaMetadata,mimeType)",
                ),
                ("pageSize", "100"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::from_status(SOURCE, response.status()));
        }

        let listing: DriveFileList = response.json().await?;
        Ok(listing.files)
    }

    async fn fetch_mime_type(&self, file_id: &str) -> Result<Option<String>, GatewayError> {
        let response = self
            .client
            .get(format!("{FILES_URL}/{file_id}"))
            .query(&[("fields", "mimeType"), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::from_status(SOURCE, response.status()));
        }

        let metadata: DriveFileMimeType = response.json().await?;
        Ok(metadata.mime_type)
    }

    async fn fetch_image_once(&self, file_id: &str) -> Result<MediaContent, GatewayError> {
        let mime_type = self.fetch_mime_type(file_id).await?.unwrap_or_default();

        let response = self
            .client
            .get(format!("{FILES_URL}/{file_id}"))
            .query(&[("alt", "media"), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::from_status(SOURCE, response.status()));
        }

        let data = response.bytes().await?;
        debug!("[drive] fetched {} bytes for {file_id}", data.len());

        Ok(finalize_content(file_id, mime_type, data))
    }
}

/// Package fetched bytes for serving. Stills in HEIC/HEIF get transcoded to
/// JPEG for browser display; videos and anything already displayable pass
/// through. A failed conversion serves the original bytes under the original
/// type rather than failing the request.
pub(crate) fn finalize_content(file_id: &str, mime_type: String, data: Bytes) -> MediaContent {
    if imaging::needs_conversion(&mime_type) {
        match imaging::transcode_to_jpeg(&data) {
            Ok(converted) => {
                debug!("[drive] converted {file_id} to jpeg");
                return MediaContent {
                    data: converted.into(),
                    mime_type: Some("image/jpeg".to_string()),
                };
            }
            Err(err) => {
                warn!("[drive] heic conversion failed for {file_id}: {err}");
            }
        }
    }

    MediaContent {
        data,
        mime_type: Some(mime_type).filter(|m| !m.is_empty()),
    }
}

/// Keep only geolocated files and order them newest first. The capture-time
/// fallback chain is embedded image time, then video recording time, then
/// the Drive upload time.
pub(crate) fn build_collection(files: Vec<DriveFile>) -> Vec<MediaItem> {
    let mut located: Vec<DriveFile> = files
        .into_iter()
        .filter(|file| file.location().is_some())
        .collect();

    located.sort_by(|a, b| {
        let a_time = a.capture_time().and_then(parse_capture_time);
        let b_time = b.capture_time().and_then(parse_capture_time);
        b_time.cmp(&a_time)
    });

    located
        .into_iter()
        .filter_map(|file| {
            let location = file.location()?;
            let taken_at = file
                .capture_time()
                .map(format_capture_time)
                .unwrap_or_default();
            Some(MediaItem {
                url: format!("/media/{}", file.id),
                id: file.id,
                name: file.name,
                coordinates: [location.longitude, location.latitude],
                taken_at,
                mime_type: file.mime_type,
                signed_url: None,
                geo_location: None,
            })
        })
        .collect()
}

#[async_trait]
impl PhotoSource for DrivePhotoSource {
    async fn fetch_photos(&self) -> Result<MediaCollection, GatewayError> {
        let files = retry_with_backoff(self.policy, || self.list_once()).await?;
        let items = build_collection(files);
        info!("[drive] listed {} geolocated items", items.len());
        Ok(MediaCollection { items })
    }

    async fn fetch_image(&self, id: &str) -> Result<MediaContent, GatewayError> {
        if let Some(cached) = self.image_cache.get(id).await {
            return Ok(cached);
        }

        let content = retry_with_backoff(self.policy, || self.fetch_image_once(id)).await?;
        self.image_cache
            .set(id, content.clone(), IMAGE_CACHE_TTL)
            .await;
        Ok(content)
    }

    fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        vec![self.image_cache.spawn_sweeper(IMAGE_CACHE_SWEEP_INTERVAL)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_files() -> Vec<DriveFile> {
        serde_json::from_str(
            r#"[
                {
                    "id": "old-photo",
                    "name": "old.jpg",
                    "createdTime": "2022-05-05T10:00:00Z",
                    "mimeType": "image/jpeg",
                    "imageMediaMetadata": {
                        "time": "2022:05:01 08:00:00",
                        "location": { "latitude": 48.85, "longitude": 2.35 }
                    }
                },
                {
                    "id": "no-location",
                    "name": "screenshot.png",
                    "createdTime": "2023-08-01T10:00:00Z",
                    "mimeType": "image/png",
                    "imageMediaMetadata": { "time": "2023:08:01 09:00:00" }
                },
                {
                    "id": "video-no-location",
                    "name": "clip.mp4",
                    "createdTime": "2023-08-02T10:00:00Z",
                    "mimeType": "video/mp4",
                    "videoMediaMetadata": { "creationTime": "2023-08-02T09:00:00Z" }
                },
                {
                    "id": "new-video",
                    "name": "pan.mp4",
                    "createdTime": "2023-09-09T10:00:00Z",
                    "mimeType": "video/mp4",
                    "videoMediaMetadata": {
                        "creationTime": "2023-09-01T12:00:00Z",
                        "location": { "latitude": 51.5, "longitude": -0.12 }
                    }
                },
                {
                    "id": "mid-photo",
                    "name": "mid.heic",
                    "createdTime": "2023-01-01T00:00:00Z",
                    "mimeType": "image/heic",
                    "imageMediaMetadata": {
                        "time": "2023:01:15 12:00:00",
                        "location": { "latitude": 40.4, "longitude": -3.7 }
                    }
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn items_without_location_are_excluded_photo_or_video() {
        let items = build_collection(fixture_files());
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert!(!ids.contains(&"no-location"));
        assert!(!ids.contains(&"video-no-location"));
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn collection_is_sorted_newest_first_across_time_sources() {
        let items = build_collection(fixture_files());
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["new-video", "mid-photo", "old-photo"]);
    }

    #[test]
    fn items_carry_geojson_order_coordinates_and_proxy_url() {
        let items = build_collection(fixture_files());
        let newest = &items[0];
        assert_eq!(newest.coordinates, [-0.12, 51.5]);
        assert_eq!(newest.url, "/media/new-video");
        assert_eq!(newest.taken_at, "Friday, 1 September 2023, 12:00");
    }

    #[test]
    fn missing_capture_time_sorts_last() {
        let files: Vec<DriveFile> = serde_json::from_str(
            r#"[
                {
                    "id": "undated",
                    "name": "u.jpg",
                    "imageMediaMetadata": {
                        "location": { "latitude": 0.0, "longitude": 0.0 }
                    }
                },
                {
                    "id": "dated",
                    "name": "d.jpg",
                    "createdTime": "2020-01-01T00:00:00Z",
                    "imageMediaMetadata": {
                        "location": { "latitude": 0.0, "longitude": 0.0 }
                    }
                }
            ]"#,
        )
        .unwrap();

        let items = build_collection(files);
        assert_eq!(items[0].id, "dated");
        assert_eq!(items[1].id, "undated");
        assert_eq!(items[1].taken_at, "");
    }

    #[test]
    fn failed_heic_conversion_serves_original_bytes_and_type() {
        let original = Bytes::from_static(b"not a decodable heic payload");
        let content = finalize_content("mid-photo", "image/heic".to_string(), original.clone());
        assert_eq!(content.data, original);
        assert_eq!(content.mime_type.as_deref(), Some("image/heic"));
    }

    #[test]
    fn successful_conversion_rewrites_type_to_jpeg() {
        // decodable bytes tagged heic stand in for a real heic still
        let mut png = Vec::new();
        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let content = finalize_content("mid-photo", "image/heic".to_string(), png.into());
        assert_eq!(content.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(&content.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn displayable_types_pass_through_untouched() {
        let original = Bytes::from_static(b"\xFF\xD8jpeg bytes");
        let content = finalize_content("old-photo", "image/jpeg".to_string(), original.clone());
        assert_eq!(content.data, original);
        assert_eq!(content.mime_type.as_deref(), Some("image/jpeg"));

        let video = finalize_content("new-video", "video/mp4".to_string(), Bytes::new());
        assert_eq!(video.mime_type.as_deref(), Some("video/mp4"));
    }
}
