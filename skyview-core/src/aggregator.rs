//! Place name → location → {weather, air quality} → one display-ready view.
//!
//! Weather is required; air quality is best effort. A pollution failure
//! leaves `pollution` empty and records [`AggregationError::Partial`] on
//! the view instead of failing the call.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    error::{AggregationError, FetchError, Stage},
    model::{
        AggregatedWeatherView, LocationCandidate, PollutionSnapshot, TodayDetails,
        WeatherSnapshot, format_clock,
    },
    provider::{GeoResolver, PollutionFetcher, WeatherFetcher},
};

pub const HOURLY_SLICE: usize = 8;
pub const DAILY_SLICE: usize = 10;

#[derive(Debug, Clone)]
pub struct WeatherAggregator {
    geo: Arc<dyn GeoResolver>,
    weather: Arc<dyn WeatherFetcher>,
    pollution: Arc<dyn PollutionFetcher>,
    language: Option<String>,
}

impl WeatherAggregator {
    pub fn new(
        geo: Arc<dyn GeoResolver>,
        weather: Arc<dyn WeatherFetcher>,
        pollution: Arc<dyn PollutionFetcher>,
    ) -> Self {
        Self { geo, weather, pollution, language: None }
    }

    /// Prefer localized place names in `language` (e.g. "de") when available.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Resolve `place_name` and build a view for the best-ranked match.
    ///
    /// Dropping the returned future cancels any outstanding requests.
    pub async fn aggregate(
        &self,
        place_name: &str,
    ) -> Result<AggregatedWeatherView, AggregationError> {
        let candidates = self.geo.resolve(place_name).await.map_err(|source| {
            AggregationError::Fatal { stage: Stage::Geocoding, source }
        })?;

        // Upstream ranking is authoritative.
        let Some(location) = candidates.into_iter().next() else {
            tracing::info!("No location found for '{}'", place_name);
            return Err(AggregationError::NotFound(place_name.to_string()));
        };

        self.aggregate_location(&location).await
    }

    /// Build a view for an already-resolved location.
    pub async fn aggregate_location(
        &self,
        location: &LocationCandidate,
    ) -> Result<AggregatedWeatherView, AggregationError> {
        tracing::info!("Fetching weather for {} ({}, {})", location.label(), location.lat, location.lon);

        let (weather, pollution) = tokio::join!(
            self.weather.fetch_weather(location.lat, location.lon),
            self.pollution.fetch_pollution(location.lat, location.lon),
        );

        let weather = weather.map_err(|source| {
            tracing::warn!("Weather fetch for {} failed: {}", location.label(), source);
            AggregationError::Fatal { stage: Stage::Weather, source }
        })?;

        Ok(merge(location, self.language.as_deref(), Utc::now(), weather, pollution))
    }
}

/// Combine fetched data into a view. Pure given its inputs.
pub fn merge(
    location: &LocationCandidate,
    language: Option<&str>,
    fetched_at: DateTime<Utc>,
    weather: WeatherSnapshot,
    pollution: Result<PollutionSnapshot, FetchError>,
) -> AggregatedWeatherView {
    let mut warnings = Vec::new();
    let pollution = match pollution {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::warn!("Air quality unavailable for {}: {}", location.label(), err);
            warnings.push(AggregationError::Partial(err));
            None
        }
    };

    let offset = weather.timezone_offset;
    let today = weather.daily.first().map(|day| TodayDetails {
        high: day.temp_max,
        low: day.temp_min,
        feels_like: day.feels_like.day,
        average: day.temp_max,
        wind_speed: day.wind_speed,
        wind_deg: day.wind_deg,
        wind_gust: day.wind_gust,
        sunrise: day.sunrise.map(|t| format_clock(t, offset)),
        sunset: day.sunset.map(|t| format_clock(t, offset)),
        uv_index: day.uv_index,
        humidity: day.humidity,
        pressure: day.pressure,
    });
    let hourly_summary = weather.daily.first().and_then(|day| day.summary.clone());

    let WeatherSnapshot { current, mut hourly, mut daily, .. } = weather;
    hourly.truncate(HOURLY_SLICE);
    daily.truncate(DAILY_SLICE);

    let (description, icon) = match current.condition {
        Some(c) => (Some(c.description), Some(c.icon)),
        None => (None, None),
    };

    AggregatedWeatherView {
        location: location.clone(),
        location_name: location.display_name(language).to_string(),
        fetched_at,
        temperature: current.temperature,
        description,
        icon,
        today,
        hourly_summary,
        hourly,
        daily,
        timezone_offset: offset,
        pollution,
        warnings,
    }
}
