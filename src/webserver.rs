use std::sync::Arc;

use log::{error, info};
use reqwest::StatusCode;
use serde::Deserialize;
use warp::{reject::Reject, Filter, Rejection, Reply};

use crate::{error::GatewayError, gateway::PhotoGateway, geocoding::GeocodingService};

#[derive(Debug)]
pub struct CustomError(String, StatusCode);

impl CustomError {
    pub fn new(msg: String, status: StatusCode) -> CustomError {
        CustomError(msg, status)
    }
}

impl Reject for CustomError {}

/// Map a gateway failure kind onto the user-visible status.
fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
        // misconfigured upstream credentials, not the caller's fault
        GatewayError::Authentication { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::Network { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn reject(err: GatewayError) -> Rejection {
    warp::reject::custom(CustomError::new(err.to_string(), status_for(&err)))
}

pub async fn handle_custom_error(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(CustomError(msg, status)) = err.find::<CustomError>() {
        Ok(warp::reply::with_status(msg.clone(), *status))
    } else {
        Err(err)
    }
}

#[derive(Debug, Deserialize)]
struct MediaQuery {
    #[serde(rename = "fileName")]
    file_name: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeQuery {
    lat: Option<f64>,
    lon: Option<f64>,
}

pub struct WebServer {
    gateway: Arc<PhotoGateway>,
    geocoding: Arc<GeocodingService>,
}

impl WebServer {
    pub fn new(gateway: Arc<PhotoGateway>, geocoding: Arc<GeocodingService>) -> Self {
        WebServer { gateway, geocoding }
    }

    pub async fn run(
        self,
        addr: std::net::SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) {
        let gateway = self.gateway;
        let geocoding = self.geocoding;

        let collection = {
            let gateway = gateway.clone();
            warp::path("collection")
                .and(warp::path::end())
                .and(warp::get())
                .and_then(move || collection_handler(gateway.clone()))
        };

        let media = {
            let gateway = gateway.clone();
            warp::path("media")
                .and(warp::path::param::<String>())
                .and(warp::path::end())
                .and(warp::get())
                .and(warp::query::<MediaQuery>())
                .and_then(move |id: String, query: MediaQuery| {
                    media_handler(gateway.clone(), id, query)
                })
        };

        let geocode = {
            let geocoding = geocoding.clone();
            warp::path("geocode")
                .and(warp::path::end())
                .and(warp::get())
                .and(warp::query::<GeocodeQuery>())
                .and_then(move |query: GeocodeQuery| geocode_handler(geocoding.clone(), query))
        };

        let routes = collection
            .or(media)
            .or(geocode)
            .recover(handle_custom_error);

        let (bound, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, shutdown);
        info!("webserver listening on {bound}");
        server.await;
    }
}

async fn collection_handler(gateway: Arc<PhotoGateway>) -> Result<impl Reply, Rejection> {
    match gateway.fetch_photos().await {
        Ok(collection) => {
            info!("served collection of {} items", collection.items.len());
            Ok(warp::reply::json(&collection))
        }
        Err(err) => {
            error!("failed to fetch photo collection: {err}");
            Err(reject(err))
        }
    }
}

async fn media_handler(
    gateway: Arc<PhotoGateway>,
    id: String,
    query: MediaQuery,
) -> Result<impl Reply, Rejection> {
    let content = gateway.fetch_image(&id).await.map_err(|err| {
        error!("failed to fetch media {id}: {err}");
        reject(err)
    })?;

    // provider-reported type wins over whatever the caller asked for
    let content_type = content
        .mime_type
        .or(query.mime_type)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let file_name = query.file_name.unwrap_or_else(|| id.clone());

    let response = warp::http::Response::builder()
        .header("Content-Type", content_type)
        .header("Content-Length", content.data.len())
        .header("Cache-Control", "public, max-age=3600")
        .header(
            "Content-Disposition",
            format!("inline; filename=\"{file_name}\""),
        )
        .body(warp::hyper::Body::from(content.data))
        .map_err(|err| reject(GatewayError::network("webserver", err)))?;

    Ok(response)
}

async fn geocode_handler(
    geocoding: Arc<GeocodingService>,
    query: GeocodeQuery,
) -> Result<impl Reply, Rejection> {
    let (lat, lon) = match (query.lat, query.lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err(reject(GatewayError::Validation(
                "missing lat or lon".into(),
            )))
        }
    };

    match geocoding.reverse_geocode(lat, lon).await {
        Ok(result) => Ok(warp::reply::json(&result)),
        Err(err) => {
            error!("reverse geocode failed for {lat},{lon}: {err}");
            Err(reject(err))
        }
    }
}
