use crate::models::config::GeocodingConfig;
use crate::models::dashboard::Coordinates;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Address is required")]
    EmptyAddress,
    #[error("Location not found")]
    NotFound,
    #[error("geocoder returned unusable coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// Forward geocoding against a Nominatim-compatible search endpoint.
pub struct Geocoder {
    client: reqwest::Client,
    search_url: String,
}

impl Geocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            search_url: format!("{}/search", config.base_url.trim_end_matches('/')),
        })
    }

    pub async fn lookup(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        let places: Vec<Place> = self
            .client
            .get(&self.search_url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        first_match(places)
    }
}

fn first_match(places: Vec<Place>) -> Result<Coordinates, GeocodeError> {
    let place = places.into_iter().next().ok_or(GeocodeError::NotFound)?;

    let lat = place
        .lat
        .parse::<f64>()
        .map_err(|_| GeocodeError::InvalidCoordinates(place.lat.clone()))?;
    let lon = place
        .lon
        .parse::<f64>()
        .map_err(|_| GeocodeError::InvalidCoordinates(place.lon.clone()))?;

    Ok(Coordinates { lat, lon })
}
