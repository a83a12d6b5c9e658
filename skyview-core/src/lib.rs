//! Core library for the `skyview` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Upstream traits for geocoding, weather and air quality, with an
//!   OpenWeather implementation
//! - The aggregation pipeline producing one display-ready view per fetch
//! - Persisted favorites and recent searches
//! - The debounced search state machine
//!
//! It is used by `skyview-cli`, but can also be reused by other front ends.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod favorites;
pub mod history;
pub mod model;
pub mod provider;
pub mod search;
pub mod store;

pub use aggregator::WeatherAggregator;
pub use config::{Config, Endpoints};
pub use error::{
    AggregationError, FetchError, ResolutionError, SearchError, Stage, StoreError, ValidationError,
};
pub use favorites::FavoritesStore;
pub use history::RecentSearches;
pub use model::{AggregatedWeatherView, LocationCandidate, PollutionSnapshot, WeatherSnapshot};
pub use provider::{GeoResolver, PollutionFetcher, WeatherFetcher, openweather::OpenWeatherClient};
pub use search::{SearchController, SearchSession, SearchState};
pub use store::{FileStore, KeyValueStore, MemoryStore};
