use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    Config,
    error::{FetchError, ResolutionError},
    model::{LocationCandidate, PollutionSnapshot, WeatherSnapshot},
    provider::openweather::OpenWeatherClient,
};

pub mod openweather;

/// Most candidates a geocoding lookup returns.
pub const GEOCODING_LIMIT: usize = 5;

#[async_trait]
pub trait GeoResolver: Send + Sync + Debug {
    /// Up to [`GEOCODING_LIMIT`] candidates in upstream relevance order.
    /// An empty list is a successful "no matches".
    async fn resolve(&self, query: &str) -> Result<Vec<LocationCandidate>, ResolutionError>;
}

#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch_weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, FetchError>;
}

#[async_trait]
pub trait PollutionFetcher: Send + Sync + Debug {
    /// Current air quality: the first entry upstream reports.
    async fn fetch_pollution(&self, lat: f64, lon: f64) -> Result<PollutionSnapshot, FetchError>;
}

/// Construct the OpenWeather client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<Arc<OpenWeatherClient>> {
    let api_key = config.api_key()?;

    let client = OpenWeatherClient::new(
        api_key,
        config.endpoints.clone(),
        config.request_timeout(),
    )?;

    Ok(Arc::new(client))
}
