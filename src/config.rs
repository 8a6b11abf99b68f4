use std::{env, str::FromStr, time::Duration};

use crate::error::GatewayError;

/// Maximum number of retry attempts for upstream calls.
pub const API_MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff.
pub const API_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Cap on the backoff delay.
pub const API_RETRY_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Signed URLs from the media API expire after 15 minutes; cache for 14 so a
/// cached URL is never handed out past validity.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(14 * 60);
pub const SIGNED_URL_CACHE_CAPACITY: usize = 500;
pub const SIGNED_URL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Maximum number of image payloads held in memory.
pub const IMAGE_CACHE_CAPACITY: usize = 200;
pub const IMAGE_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);
pub const IMAGE_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// JPEG quality used when transcoding HEIC/HEIF stills.
pub const HEIC_CONVERSION_QUALITY: u8 = 90;

/// OSM Nominatim usage policy: at most one request per second.
pub const NOMINATIM_RATE_LIMIT: Duration = Duration::from_millis(1000);
/// Decimal places for geocode cache keys (4 ≈ 11 m).
pub const DEFAULT_GEOCODE_PRECISION: usize = 4;
pub const GEOCODE_CACHE_CAPACITY: usize = 1000;
pub const GEOCODE_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
pub const GEOCODE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Which upstream backend serves the photo collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiSource {
    Drive,
    MediaApi,
}

impl FromStr for ApiSource {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(ApiSource::Drive),
            "media-api" => Ok(ApiSource::MediaApi),
            other => Err(GatewayError::Validation(format!(
                "invalid API_SOURCE \"{other}\", must be \"drive\" or \"media-api\""
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// The active photo backend
    pub api_source: ApiSource,
    /// Google API key, required when the source is drive
    pub google_api_key: Option<String>,
    /// Drive folder to list, required when the source is drive
    pub google_folder_id: Option<String>,
    /// Base url of the media API, required when the source is media-api
    pub media_api_url: Option<String>,
    /// API key for the media API, required when the source is media-api
    pub media_api_key: Option<String>,
    /// Decimal places used to round geocode cache keys
    pub geocode_precision: usize,
    /// Address the webserver binds to
    pub bind_address: std::net::SocketAddr,
}

impl Config {
    /// Load and validate configuration from the environment. Fails fast on
    /// an unrecognized source or missing provider-specific variables.
    pub fn from_env() -> Result<Config, GatewayError> {
        let api_source: ApiSource = env::var("API_SOURCE")
            .map_err(|_| GatewayError::Validation("API_SOURCE is not set".into()))?
            .parse()?;

        let config = Config {
            api_source,
            google_api_key: env::var("GOOGLE_API_KEY").ok(),
            google_folder_id: env::var("GOOGLE_FOLDER_ID").ok(),
            media_api_url: env::var("MEDIA_API_URL").ok(),
            media_api_key: env::var("MEDIA_API_KEY").ok(),
            geocode_precision: env::var("GEOCODE_CACHE_PRECISION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_GEOCODE_PRECISION),
            bind_address: env::var("BIND_ADDRESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| ([127, 0, 0, 1], 3000).into()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), GatewayError> {
        let missing: Vec<&str> = match self.api_source {
            ApiSource::Drive => [
                ("GOOGLE_API_KEY", &self.google_api_key),
                ("GOOGLE_FOLDER_ID", &self.google_folder_id),
            ]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name)
            .collect(),
            ApiSource::MediaApi => [
                ("MEDIA_API_URL", &self.media_api_url),
                ("MEDIA_API_KEY", &self.media_api_key),
            ]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name)
            .collect(),
        };

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Validation(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(source: ApiSource) -> Config {
        Config {
            api_source: source,
            google_api_key: None,
            google_folder_id: None,
            media_api_url: None,
            media_api_key: None,
            geocode_precision: DEFAULT_GEOCODE_PRECISION,
            bind_address: ([127, 0, 0, 1], 3000).into(),
        }
    }

    #[test]
    fn api_source_parses_known_values() {
        assert_eq!("drive".parse::<ApiSource>().unwrap(), ApiSource::Drive);
        assert_eq!(
            "media-api".parse::<ApiSource>().unwrap(),
            ApiSource::MediaApi
        );
    }

    #[test]
    fn api_source_rejects_unknown_values() {
        assert!("dropbox".parse::<ApiSource>().is_err());
        assert!("".parse::<ApiSource>().is_err());
    }

    #[test]
    fn drive_source_requires_google_variables() {
        let mut config = base_config(ApiSource::Drive);
        assert!(config.validate().is_err());

        config.google_api_key = Some("key".into());
        assert!(config.validate().is_err());

        config.google_folder_id = Some("folder".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn media_api_source_requires_api_variables() {
        let mut config = base_config(ApiSource::MediaApi);
        assert!(config.validate().is_err());

        config.media_api_url = Some("https://example.com/api".into());
        config.media_api_key = Some("key".into());
        assert!(config.validate().is_ok());
    }
}
