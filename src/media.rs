use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

/// One geolocated photo or video, rebuilt fresh on every listing.
#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    /// Provider-specific identifier: Drive file id or media-API file name
    pub id: String,
    pub name: String,
    /// \[longitude, latitude\]
    pub coordinates: [f64; 2],
    /// Display-formatted capture timestamp
    pub taken_at: String,
    pub mime_type: Option<String>,
    /// Proxy url through this gateway
    pub url: String,
    /// Direct signed url, when the provider issues them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
    /// Human-readable place name reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<String>,
}

/// The full geolocated collection as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MediaCollection {
    pub items: Vec<MediaItem>,
}

/// Parse an upstream capture timestamp. Accepts ISO-8601 UTC
/// (`2023-06-01T12:30:00Z`) and the EXIF-style local form
/// (`2023:06:01 12:30:00`).
pub fn parse_capture_time(timestamp: &str) -> Option<NaiveDateTime> {
    if timestamp.contains('T') {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
            return Some(parsed.naive_utc());
        }
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y:%m:%d %H:%M:%S").ok()
}

/// Render a capture timestamp once for display, e.g.
/// `Thursday, 1 June 2023, 12:30`. Unparseable input is passed through
/// unchanged rather than dropped.
pub fn format_capture_time(timestamp: &str) -> String {
    match parse_capture_time(timestamp) {
        Some(parsed) => parsed.format("%A, %-d %B %Y, %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}
