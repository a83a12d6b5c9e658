use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::{collections::BTreeMap, time::Duration};

use crate::{
    config::Endpoints,
    error::{FetchError, ResolutionError},
    model::{
        AirQuality, Condition, CurrentConditions, DailyRecord, FeelsLike, HourlyRecord,
        LocationCandidate, Pollutants, PollutionSnapshot, WeatherSnapshot, coordinates_in_range,
    },
};

use super::{GEOCODING_LIMIT, GeoResolver, PollutionFetcher, WeatherFetcher};

/// Client for the OpenWeather geocoding, One Call and air pollution APIs.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    endpoints: Endpoints,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoints: Endpoints,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key: api_key.into(),
            endpoints,
            http,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &'static str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        tracing::debug!("Requesting OpenWeather {} from {}", what, url);

        let res = self
            .http
            .get(url)
            .query(params)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|err| {
                tracing::debug!("OpenWeather {} request failed: {}", what, err);
                FetchError::from(err)
            })?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            tracing::debug!("OpenWeather {} returned status {}", what, status);
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|err| FetchError::Decode(format!("OpenWeather {what} JSON: {err}")))
    }
}

fn check_coordinates(lat: f64, lon: f64) -> Result<(), FetchError> {
    if coordinates_in_range(lat, lon) {
        Ok(())
    } else {
        Err(FetchError::BadRequest(format!("coordinates out of range: lat={lat}, lon={lon}")))
    }
}

#[async_trait]
impl GeoResolver for OpenWeatherClient {
    async fn resolve(&self, query: &str) -> Result<Vec<LocationCandidate>, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FetchError::BadRequest("empty location query".to_string()));
        }

        let params = [("q", query.to_string()), ("limit", GEOCODING_LIMIT.to_string())];
        let mut candidates: Vec<LocationCandidate> =
            self.get_json("geocoding", &self.endpoints.geo_url, &params).await?;

        if let Some(bad) = candidates.iter().find(|c| !c.has_valid_coordinates()) {
            return Err(FetchError::Decode(format!(
                "geocoding returned out-of-range coordinates for '{}': lat={}, lon={}",
                bad.name, bad.lat, bad.lon
            )));
        }

        candidates.truncate(GEOCODING_LIMIT);
        tracing::debug!("Geocoding '{}' matched {} candidate(s)", query, candidates.len());
        Ok(candidates)
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    async fn fetch_weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, FetchError> {
        check_coordinates(lat, lon)?;

        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("units", "metric".to_string()),
        ];
        let parsed: OwOneCall = self.get_json("weather", &self.endpoints.weather_url, &params).await?;

        parsed.into_snapshot()
    }
}

#[async_trait]
impl PollutionFetcher for OpenWeatherClient {
    async fn fetch_pollution(&self, lat: f64, lon: f64) -> Result<PollutionSnapshot, FetchError> {
        check_coordinates(lat, lon)?;

        let params = [("lat", lat.to_string()), ("lon", lon.to_string())];
        let parsed: OwPollutionResponse =
            self.get_json("air pollution", &self.endpoints.pollution_url, &params).await?;

        parsed.into_snapshot()
    }
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    temp: f64,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwHourly {
    dt: i64,
    temp: f64,
    feels_like: f64,
    pressure: i32,
    humidity: u8,
    wind_speed: f64,
    wind_deg: u16,
    wind_gust: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwFeelsLike {
    day: f64,
    night: f64,
    eve: f64,
    morn: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    // Absent or 0 during polar day/night and on days without a moon event.
    #[serde(default)]
    sunrise: Option<i64>,
    #[serde(default)]
    sunset: Option<i64>,
    #[serde(default)]
    moonrise: Option<i64>,
    #[serde(default)]
    moonset: Option<i64>,
    moon_phase: f64,
    temp: OwDailyTemp,
    feels_like: OwFeelsLike,
    pressure: i32,
    humidity: u8,
    wind_speed: f64,
    wind_deg: u16,
    wind_gust: Option<f64>,
    pop: f64,
    clouds: u8,
    uvi: f64,
    summary: Option<String>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCall {
    #[serde(default)]
    timezone_offset: i32,
    current: OwCurrent,
    hourly: Vec<OwHourly>,
    daily: Vec<OwDaily>,
}

impl OwOneCall {
    fn into_snapshot(self) -> Result<WeatherSnapshot, FetchError> {
        let hourly = self
            .hourly
            .into_iter()
            .map(|h| -> Result<HourlyRecord, FetchError> {
                Ok(HourlyRecord {
                    time: timestamp(h.dt)?,
                    temperature: h.temp,
                    feels_like: h.feels_like,
                    pressure: h.pressure,
                    humidity: h.humidity,
                    wind_speed: h.wind_speed,
                    wind_deg: h.wind_deg,
                    wind_gust: h.wind_gust,
                    condition: first_condition(h.weather),
                })
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        let daily = self
            .daily
            .into_iter()
            .map(OwDaily::into_record)
            .collect::<Result<Vec<_>, FetchError>>()?;

        ensure_chronological("hourly", hourly.iter().map(|h| h.time))?;
        ensure_chronological("daily", daily.iter().map(|d| d.time))?;

        Ok(WeatherSnapshot {
            timezone_offset: self.timezone_offset,
            current: CurrentConditions {
                temperature: self.current.temp,
                condition: first_condition(self.current.weather),
            },
            hourly,
            daily,
        })
    }
}

impl OwDaily {
    fn into_record(self) -> Result<DailyRecord, FetchError> {
        if !(0.0..=1.0).contains(&self.moon_phase) {
            return Err(FetchError::Decode(format!("moon phase {} outside [0, 1]", self.moon_phase)));
        }
        if !(0.0..=1.0).contains(&self.pop) {
            return Err(FetchError::Decode(format!(
                "precipitation probability {} outside [0, 1]",
                self.pop
            )));
        }
        if self.uvi.is_nan() || self.uvi < 0.0 {
            return Err(FetchError::Decode(format!("negative UV index {}", self.uvi)));
        }

        Ok(DailyRecord {
            time: timestamp(self.dt)?,
            sunrise: optional_timestamp(self.sunrise),
            sunset: optional_timestamp(self.sunset),
            moonrise: optional_timestamp(self.moonrise),
            moonset: optional_timestamp(self.moonset),
            moon_phase: self.moon_phase,
            temp_min: self.temp.min,
            temp_max: self.temp.max,
            feels_like: FeelsLike {
                day: self.feels_like.day,
                night: self.feels_like.night,
                eve: self.feels_like.eve,
                morn: self.feels_like.morn,
            },
            pressure: self.pressure,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            wind_deg: self.wind_deg,
            wind_gust: self.wind_gust,
            precipitation_probability: self.pop,
            clouds: self.clouds,
            uv_index: self.uvi,
            summary: self.summary.filter(|s| !s.trim().is_empty()),
            condition: first_condition(self.weather),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwAqi {
    aqi: i64,
}

#[derive(Debug, Deserialize)]
struct OwPollutionEntry {
    dt: i64,
    main: OwAqi,
    components: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct OwPollutionResponse {
    list: Vec<OwPollutionEntry>,
}

impl OwPollutionResponse {
    fn into_snapshot(self) -> Result<PollutionSnapshot, FetchError> {
        let entry = self
            .list
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Decode("air pollution response contained no data".into()))?;

        let aqi = AirQuality::try_from(entry.main.aqi)
            .map_err(|v| FetchError::Decode(format!("AQI {v} outside 1..=5")))?;

        let component = |name: &str| {
            entry
                .components
                .get(name)
                .copied()
                .ok_or_else(|| FetchError::Decode(format!("missing pollutant '{name}'")))
        };

        let components = Pollutants {
            co: component("co")?,
            no: component("no")?,
            no2: component("no2")?,
            o3: component("o3")?,
            so2: component("so2")?,
            pm2_5: component("pm2_5")?,
            pm10: component("pm10")?,
            nh3: component("nh3")?,
        };

        if !components.all_non_negative() {
            return Err(FetchError::Decode("negative pollutant concentration".into()));
        }

        Ok(PollutionSnapshot {
            aqi,
            measured_at: timestamp(entry.dt)?,
            components,
        })
    }
}

fn first_condition(weather: Vec<OwWeather>) -> Option<Condition> {
    weather.into_iter().next().map(|w| Condition {
        description: w.description,
        icon: w.icon,
    })
}

fn timestamp(ts: i64) -> Result<DateTime<Utc>, FetchError> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| FetchError::Decode(format!("invalid timestamp {ts}")))
}

fn optional_timestamp(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.filter(|t| *t > 0).and_then(|t| DateTime::from_timestamp(t, 0))
}

fn ensure_chronological(
    what: &str,
    times: impl Iterator<Item = DateTime<Utc>>,
) -> Result<(), FetchError> {
    let mut previous: Option<DateTime<Utc>> = None;
    for t in times {
        if previous.is_some_and(|p| t < p) {
            return Err(FetchError::Decode(format!("{what} records out of chronological order")));
        }
        previous = Some(t);
    }
    Ok(())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn daily(dt: i64) -> serde_json::Value {
        json!({
            "dt": dt, "sunrise": dt - 20000, "sunset": dt + 20000,
            "moonrise": 0, "moonset": dt + 3000, "moon_phase": 0.25,
            "temp": { "min": 10.5, "max": 19.2 },
            "feels_like": { "day": 18.0, "night": 9.0, "eve": 15.0, "morn": 8.0 },
            "pressure": 1012, "humidity": 60, "wind_speed": 4.1, "wind_deg": 250,
            "pop": 0.35, "clouds": 40, "uvi": 3.2, "summary": "Rain in the afternoon",
            "weather": [{ "description": "light rain", "icon": "10d" }]
        })
    }

    fn one_call(daily_dts: &[i64]) -> serde_json::Value {
        json!({
            "timezone_offset": 3600,
            "current": { "temp": 17.3, "weather": [{ "description": "clear sky", "icon": "01d" }] },
            "hourly": [],
            "daily": daily_dts.iter().map(|dt| daily(*dt)).collect::<Vec<_>>()
        })
    }

    #[test]
    fn one_call_maps_to_snapshot() {
        let parsed: OwOneCall = serde_json::from_value(one_call(&[1_700_000_000])).unwrap();
        let snapshot = parsed.into_snapshot().unwrap();

        assert_eq!(snapshot.timezone_offset, 3600);
        assert_eq!(snapshot.current.condition.as_ref().unwrap().icon, "01d");
        let today = &snapshot.daily[0];
        assert_eq!(today.moonrise, None);
        assert!(today.moonset.is_some());
        assert_eq!(today.wind_gust, None);
        assert_eq!(today.precipitation_percent(), 35);
        assert_eq!(today.summary.as_deref(), Some("Rain in the afternoon"));
    }

    #[test]
    fn out_of_order_daily_records_are_rejected() {
        let parsed: OwOneCall =
            serde_json::from_value(one_call(&[1_700_086_400, 1_700_000_000])).unwrap();
        let err = parsed.into_snapshot().unwrap_err();
        assert!(matches!(err, FetchError::Decode(msg) if msg.contains("daily")));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let mut body = one_call(&[1_700_000_000]);
        body["daily"][0]["pop"] = json!(1.5);
        let parsed: OwOneCall = serde_json::from_value(body).unwrap();
        assert!(matches!(parsed.into_snapshot(), Err(FetchError::Decode(_))));
    }

    fn pollution(aqi: i64, co: f64) -> serde_json::Value {
        json!({
            "list": [{
                "dt": 1_700_000_000,
                "main": { "aqi": aqi },
                "components": {
                    "co": co, "no": 0.1, "no2": 3.4, "o3": 60.1,
                    "so2": 0.6, "pm2_5": 2.3, "pm10": 4.1, "nh3": 0.4
                }
            }]
        })
    }

    #[test]
    fn pollution_takes_first_entry() {
        let parsed: OwPollutionResponse = serde_json::from_value(pollution(2, 201.9)).unwrap();
        let snapshot = parsed.into_snapshot().unwrap();
        assert_eq!(snapshot.aqi, AirQuality::Fair);
        assert_eq!(snapshot.components.co, 201.9);
        assert_eq!(snapshot.components.pm2_5, 2.3);
    }

    #[test]
    fn empty_pollution_list_is_a_decode_error() {
        let parsed: OwPollutionResponse = serde_json::from_value(json!({ "list": [] })).unwrap();
        assert!(matches!(parsed.into_snapshot(), Err(FetchError::Decode(_))));
    }

    #[test]
    fn pollution_rejects_bad_aqi_and_negative_values() {
        let parsed: OwPollutionResponse = serde_json::from_value(pollution(7, 1.0)).unwrap();
        assert!(matches!(parsed.into_snapshot(), Err(FetchError::Decode(_))));

        let parsed: OwPollutionResponse = serde_json::from_value(pollution(1, -1.0)).unwrap();
        assert!(matches!(parsed.into_snapshot(), Err(FetchError::Decode(_))));
    }

    #[test]
    fn check_coordinates_rejects_out_of_range() {
        assert!(check_coordinates(48.85, 2.35).is_ok());
        assert!(matches!(check_coordinates(91.0, 0.0), Err(FetchError::BadRequest(_))));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let short = "oops";
        assert_eq!(truncate_body(short), "oops");

        let long = "é".repeat(250);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
    }
}
