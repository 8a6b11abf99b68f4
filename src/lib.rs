pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod geocoding;
pub mod imaging;
pub mod json_templates;
pub mod media;
pub mod photo_source;
pub mod retry;
pub mod webserver;

pub use crate::{
    config::Config,
    error::GatewayError,
    gateway::PhotoGateway,
    geocoding::{GeocodingService, NominatimClient},
};
