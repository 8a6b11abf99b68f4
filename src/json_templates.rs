//! Wire shapes for the three upstream APIs.

use serde::Deserialize;

// ---- Google Drive v3 ----

#[derive(Debug, Deserialize)]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub created_time: Option<String>,
    pub mime_type: Option<String>,
    pub image_media_metadata: Option<DriveMediaMetadata>,
    pub video_media_metadata: Option<DriveMediaMetadata>,
}

/// Drive reports image and video metadata under different keys but with the
/// same shape for our purposes: an optional capture time and an optional
/// recorded location.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveMediaMetadata {
    /// EXIF capture time on images, `YYYY:MM:DD HH:MM:SS`
    pub time: Option<String>,
    /// Recording time on videos, ISO-8601
    pub creation_time: Option<String>,
    pub location: Option<DriveLocation>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DriveLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Response to a metadata-only `files/{id}?fields=mimeType` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileMimeType {
    pub mime_type: Option<String>,
}

impl DriveFile {
    /// Recorded location, wherever Drive put it.
    pub fn location(&self) -> Option<DriveLocation> {
        self.image_media_metadata
            .as_ref()
            .or(self.video_media_metadata.as_ref())
            .and_then(|meta| meta.location)
    }

    /// Best-known capture time: embedded image time, then video recording
    /// time, then the time Drive assigned on upload.
    pub fn capture_time(&self) -> Option<&str> {
        self.image_media_metadata
            .as_ref()
            .and_then(|meta| meta.time.as_deref())
            .or_else(|| {
                self.video_media_metadata
                    .as_ref()
                    .and_then(|meta| meta.creation_time.as_deref())
            })
            .or(self.created_time.as_deref())
    }
}

// ---- Signed-URL media API ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListedMedia {
    pub id: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub geo_location: Option<String>,
    pub coordinates: Option<ListedCoordinates>,
    pub formatted_date: Option<String>,
}

/// The listing endpoint serializes coordinates as strings.
#[derive(Debug, Deserialize)]
pub struct ListedCoordinates {
    pub lng: String,
    pub lat: String,
}

impl ListedMedia {
    /// `(longitude, latitude)` when both components parse as numbers.
    pub fn parsed_coordinates(&self) -> Option<(f64, f64)> {
        let coords = self.coordinates.as_ref()?;
        let lng: f64 = coords.lng.trim().parse().ok()?;
        let lat: f64 = coords.lat.trim().parse().ok()?;
        Some((lng, lat))
    }
}

// ---- Nominatim reverse geocoding ----

#[derive(Debug, Deserialize)]
pub struct NominatimResponse {
    #[serde(default)]
    pub address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
pub struct NominatimAddress {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub hamlet: Option<String>,
    pub suburb: Option<String>,
    pub country: Option<String>,
}

impl NominatimAddress {
    /// Most specific settlement name available.
    pub fn settlement(&self) -> Option<String> {
        self.city
            .clone()
            .or_else(|| self.town.clone())
            .or_else(|| self.village.clone())
            .or_else(|| self.hamlet.clone())
            .or_else(|| self.suburb.clone())
    }
}
