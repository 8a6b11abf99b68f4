use std::{process::exit, sync::Arc};

use log::{error, info};
use photomap_lib::{
    config::{Config, GEOCODE_SWEEP_INTERVAL, NOMINATIM_RATE_LIMIT},
    gateway::PhotoGateway,
    geocoding::{GeocodingService, NominatimClient},
    webserver::WebServer,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            exit(1);
        }
    };
    info!("using api source: {:?}", config.api_source);

    let gateway = match PhotoGateway::new(&config) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            error!("failed to construct photo source: {}", e);
            exit(1);
        }
    };

    let nominatim = match NominatimClient::new() {
        Ok(client) => client,
        Err(e) => {
            error!("failed to construct geocoding client: {}", e);
            exit(1);
        }
    };
    let geocoding = GeocodingService::new(
        Box::new(nominatim),
        config.geocode_precision,
        NOMINATIM_RATE_LIMIT,
    );

    // background sweepers, cancelled at shutdown
    let mut sweepers = gateway.spawn_sweepers();
    sweepers.push(geocoding.cache().spawn_sweeper(GEOCODE_SWEEP_INTERVAL));

    WebServer::new(Arc::clone(&gateway), Arc::clone(&geocoding))
        .run(config.bind_address, async {
            tokio::signal::ctrl_c().await.ok();
            info!("ctrl-c received, shutting down");
        })
        .await;

    for sweeper in sweepers {
        sweeper.abort();
    }
}
