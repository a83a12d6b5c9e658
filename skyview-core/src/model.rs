use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AggregationError;

/// Coordinates are compared at 4 decimal places (~11 m).
const KEY_SCALE: f64 = 10_000.0;

/// A geocoding match. Also the persisted shape of a favorite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_names: Option<BTreeMap<String, String>>,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Structural identity of a place, stable across independent lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey {
    name: String,
    country: String,
    state: Option<String>,
    lat_e4: i64,
    lon_e4: i64,
}

impl LocationCandidate {
    pub fn key(&self) -> LocationKey {
        LocationKey {
            name: self.name.clone(),
            country: self.country.clone(),
            state: self.state.clone(),
            lat_e4: (self.lat * KEY_SCALE).round() as i64,
            lon_e4: (self.lon * KEY_SCALE).round() as i64,
        }
    }

    pub fn is_same_place(&self, other: &LocationCandidate) -> bool {
        self.key() == other.key()
    }

    pub fn has_valid_coordinates(&self) -> bool {
        coordinates_in_range(self.lat, self.lon)
    }

    /// Localized name for `lang` (e.g. "de"), falling back to `name`.
    pub fn display_name(&self, lang: Option<&str>) -> &str {
        lang.and_then(|l| self.local_names.as_ref()?.get(l))
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// "Name, State, CC" with the state omitted when unknown.
    pub fn label(&self) -> String {
        match self.state.as_deref() {
            Some(state) if !state.is_empty() => {
                format!("{}, {}, {}", self.name, state, self.country)
            }
            _ => format!("{}, {}", self.name, self.country),
        }
    }
}

pub fn coordinates_in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRecord {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    pub pressure: i32,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: u16,
    pub wind_gust: Option<f64>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeelsLike {
    pub day: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecord {
    pub time: DateTime<Utc>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub moonrise: Option<DateTime<Utc>>,
    pub moonset: Option<DateTime<Utc>>,
    /// 0 and 1 are new moon, 0.5 full moon.
    pub moon_phase: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub feels_like: FeelsLike,
    pub pressure: i32,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: u16,
    pub wind_gust: Option<f64>,
    /// Probability in [0, 1].
    pub precipitation_probability: f64,
    pub clouds: u8,
    pub uv_index: f64,
    pub summary: Option<String>,
    pub condition: Option<Condition>,
}

impl DailyRecord {
    pub fn precipitation_percent(&self) -> u8 {
        (self.precipitation_probability * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    /// Seconds east of UTC for the forecast location.
    pub timezone_offset: i32,
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyRecord>,
    pub daily: Vec<DailyRecord>,
}

/// AQI category as reported upstream (1 = good .. 5 = very poor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AirQuality {
    Good = 1,
    Fair = 2,
    Moderate = 3,
    Poor = 4,
    VeryPoor = 5,
}

impl AirQuality {
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            AirQuality::Good => "Good",
            AirQuality::Fair => "Fair",
            AirQuality::Moderate => "Moderate",
            AirQuality::Poor => "Poor",
            AirQuality::VeryPoor => "Very Poor",
        }
    }
}

impl TryFrom<i64> for AirQuality {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AirQuality::Good),
            2 => Ok(AirQuality::Fair),
            3 => Ok(AirQuality::Moderate),
            4 => Ok(AirQuality::Poor),
            5 => Ok(AirQuality::VeryPoor),
            other => Err(other),
        }
    }
}

/// Concentrations in μg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pollutants {
    pub co: f64,
    pub no: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
    pub nh3: f64,
}

impl Pollutants {
    pub fn all_non_negative(&self) -> bool {
        [self.co, self.no, self.no2, self.o3, self.so2, self.pm2_5, self.pm10, self.nh3]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutionSnapshot {
    pub aqi: AirQuality,
    pub measured_at: DateTime<Utc>,
    pub components: Pollutants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UvLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl UvLevel {
    pub fn from_index(uvi: f64) -> Self {
        match uvi {
            x if x < 3.0 => UvLevel::Low,
            x if x < 6.0 => UvLevel::Moderate,
            x if x < 8.0 => UvLevel::High,
            x if x < 11.0 => UvLevel::VeryHigh,
            _ => UvLevel::Extreme,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UvLevel::Low => "Low",
            UvLevel::Moderate => "Moderate",
            UvLevel::High => "High",
            UvLevel::VeryHigh => "Very High",
            UvLevel::Extreme => "Extreme",
        }
    }
}

/// Figures derived from the first daily record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayDetails {
    pub high: f64,
    pub low: f64,
    pub feels_like: f64,
    /// Today's maximum, not a true mean.
    pub average: f64,
    pub wind_speed: f64,
    pub wind_deg: u16,
    pub wind_gust: Option<f64>,
    /// "HH:MM" in the location's local time; `None` when upstream has no event.
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub uv_index: f64,
    pub humidity: u8,
    pub pressure: i32,
}

impl TodayDetails {
    pub fn uv_level(&self) -> UvLevel {
        UvLevel::from_index(self.uv_index)
    }
}

/// Display-ready result of one fetch cycle. Replaced, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedWeatherView {
    pub location: LocationCandidate,
    pub location_name: String,
    pub fetched_at: DateTime<Utc>,
    pub temperature: f64,
    pub description: Option<String>,
    pub icon: Option<String>,
    /// `None` when upstream returned no daily records.
    pub today: Option<TodayDetails>,
    pub hourly_summary: Option<String>,
    pub hourly: Vec<HourlyRecord>,
    pub daily: Vec<DailyRecord>,
    pub timezone_offset: i32,
    pub pollution: Option<PollutionSnapshot>,
    #[serde(skip)]
    pub warnings: Vec<AggregationError>,
}

impl AggregatedWeatherView {
    /// True when air quality could not be fetched for this view.
    pub fn is_partial(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, AggregationError::Partial(_)))
    }
}

/// Format `time` as "HH:MM" shifted by `offset_secs`.
pub fn format_clock(time: DateTime<Utc>, offset_secs: i32) -> String {
    let offset = FixedOffset::east_opt(offset_secs).unwrap_or_else(|| Utc.fix());
    time.with_timezone(&offset).format("%H:%M").to_string()
}
