use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use crate::{
    cache::BoundedTtlCache,
    config::{GEOCODE_CACHE_CAPACITY, GEOCODE_CACHE_TTL},
    error::GatewayError,
    json_templates::NominatimResponse,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeocodeResult {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// The upstream that turns coordinates into place names. A trait seam so the
/// queue can be exercised without the network.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<GeocodeResult, GatewayError>;
}

/// OSM Nominatim client. The usage policy allows one request per second,
/// which [`GeocodingService`] enforces; this type only speaks the protocol.
pub struct NominatimClient {
    client: reqwest::Client,
}

impl NominatimClient {
    pub fn new() -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent("photomap photo map gateway")
            .build()?;
        Ok(NominatimClient { client })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<GeocodeResult, GatewayError> {
        let response = self
            .client
            .get("https://nominatim.openstreetmap.org/reverse")
            .query(&[
                ("format", "json"),
                ("lat", &lat.to_string()),
                ("lon", &lon.to_string()),
                ("zoom", "18"),
                ("addressdetails", "1"),
            ])
            .header("Accept-Language", "en")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::from_status("nominatim", response.status()));
        }

        let body: NominatimResponse = response.json().await?;
        Ok(GeocodeResult {
            city: body.address.settlement(),
            country: body.address.country,
        })
    }
}

struct QueuedRequest {
    lat: f64,
    lon: f64,
    reply: oneshot::Sender<Result<GeocodeResult, GatewayError>>,
}

struct QueueState {
    backlog: VecDeque<QueuedRequest>,
    /// True while a drainer task is running.
    draining: bool,
}

/// Serialized reverse-geocoding queue.
///
/// A single drainer task processes the backlog strictly in arrival order and
/// keeps at least `min_interval` between upstream calls, so the upstream's
/// rate limit holds regardless of concurrent caller volume. Cache hits never
/// touch the queue. The backlog and the draining flag live under one mutex:
/// the drainer observes emptiness and clears the flag in the same critical
/// section a producer uses to check it, so a request can never be stranded.
pub struct GeocodingService {
    geocoder: Box<dyn ReverseGeocoder>,
    cache: Arc<BoundedTtlCache<GeocodeResult>>,
    precision: usize,
    min_interval: Duration,
    state: Mutex<QueueState>,
}

impl GeocodingService {
    pub fn new(
        geocoder: Box<dyn ReverseGeocoder>,
        precision: usize,
        min_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(GeocodingService {
            geocoder,
            cache: BoundedTtlCache::new("geocode cache", GEOCODE_CACHE_CAPACITY),
            precision,
            min_interval,
            state: Mutex::new(QueueState {
                backlog: VecDeque::new(),
                draining: false,
            }),
        })
    }

    /// The backing cache, exposed so the process can run its sweeper.
    pub fn cache(&self) -> &Arc<BoundedTtlCache<GeocodeResult>> {
        &self.cache
    }

    /// Rounding collapses nearby lookups onto one cache slot; at the default
    /// four decimal places that is roughly an 11 m grid.
    fn cache_key(&self, lat: f64, lon: f64) -> String {
        format!("{lat:.prec$},{lon:.prec$}", prec = self.precision)
    }

    fn validate(lat: f64, lon: f64) -> Result<(), GatewayError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GatewayError::Validation(format!("invalid latitude {lat}")));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GatewayError::Validation(format!("invalid longitude {lon}")));
        }
        Ok(())
    }

    /// Resolve coordinates to a place name, going through the rate-limited
    /// queue on a cache miss.
    pub async fn reverse_geocode(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
    ) -> Result<GeocodeResult, GatewayError> {
        Self::validate(lat, lon)?;

        let key = self.cache_key(lat, lon);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let (reply, receiver) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state.backlog.push_back(QueuedRequest { lat, lon, reply });
            if !state.draining {
                state.draining = true;
                let service = Arc::clone(self);
                tokio::task::spawn(async move { service.drain().await });
            }
        }

        receiver
            .await
            .map_err(|_| GatewayError::network("geocoding", "queue worker dropped the request"))?
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let request = {
                let mut state = self.state.lock().await;
                match state.backlog.pop_front() {
                    Some(request) => request,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            let key = self.cache_key(request.lat, request.lon);

            // A duplicate enqueued while the identical lookup was in flight
            // resolves from cache; no upstream call was made, so the spacing
            // sleep is skipped.
            if let Some(hit) = self.cache.get(&key).await {
                debug!("[geocoding] dequeue-time cache hit for {key}");
                let _ = request.reply.send(Ok(hit));
                continue;
            }

            debug!("[geocoding] fetching location for {key}");
            match self.geocoder.reverse(request.lat, request.lon).await {
                Ok(result) => {
                    self.cache.set(key, result.clone(), GEOCODE_CACHE_TTL).await;
                    let _ = request.reply.send(Ok(result));
                }
                Err(err) => {
                    // one bad lookup fails one caller, the backlog drains on
                    error!("[geocoding] lookup failed for {key}: {err}");
                    let _ = request.reply.send(Err(err));
                }
            }

            // An upstream call was made either way; hold the line before the
            // next dequeue.
            tokio::time::sleep(self.min_interval).await;
        }
    }
}
