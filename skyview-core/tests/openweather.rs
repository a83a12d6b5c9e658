//! Integration tests for OpenWeatherClient and the aggregation pipeline
//! against a mock HTTP server.

use std::{sync::Arc, time::Duration};

use skyview_core::{
    AggregationError, Endpoints, FetchError, GeoResolver, OpenWeatherClient, PollutionFetcher,
    Stage, WeatherAggregator, WeatherFetcher, model::AirQuality,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GEO_PATH: &str = "/geo/1.0/direct";
const WEATHER_PATH: &str = "/data/3.0/onecall";
const POLLUTION_PATH: &str = "/data/2.5/air_pollution";

fn client(server: &MockServer) -> OpenWeatherClient {
    OpenWeatherClient::new("TEST_KEY", Endpoints::with_base(&server.uri()), Duration::from_secs(2))
        .unwrap()
}

fn berlin() -> serde_json::Value {
    serde_json::json!({
        "name": "Berlin",
        "local_names": { "de": "Berlin", "ru": "Берлин" },
        "lat": 52.5170365,
        "lon": 13.3888599,
        "country": "DE",
        "state": "Berlin"
    })
}

fn hourly(dt: i64) -> serde_json::Value {
    serde_json::json!({
        "dt": dt, "temp": 6.2, "feels_like": 3.1, "pressure": 1021, "humidity": 81,
        "wind_speed": 4.6, "wind_deg": 240, "wind_gust": 9.8,
        "weather": [{ "description": "overcast clouds", "icon": "04n" }]
    })
}

fn daily(dt: i64) -> serde_json::Value {
    serde_json::json!({
        "dt": dt, "sunrise": dt - 18000, "sunset": dt + 12000,
        "moonrise": dt - 3000, "moonset": dt + 30000, "moon_phase": 0.62,
        "temp": { "day": 7.0, "min": 2.4, "max": 8.1, "night": 3.0, "eve": 5.0, "morn": 2.5 },
        "feels_like": { "day": 4.9, "night": 0.2, "eve": 2.7, "morn": -0.8 },
        "pressure": 1019, "humidity": 77, "dew_point": 2.1,
        "wind_speed": 5.2, "wind_deg": 250, "wind_gust": 11.3,
        "weather": [{ "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }],
        "clouds": 90, "pop": 0.6, "rain": 1.2, "uvi": 0.9,
        "summary": "Expect a day of partly cloudy with rain"
    })
}

fn one_call(hours: usize, days: usize) -> serde_json::Value {
    let start = 1_700_000_000_i64;
    serde_json::json!({
        "lat": 52.517, "lon": 13.3889, "timezone": "Europe/Berlin", "timezone_offset": 3600,
        "current": {
            "dt": start, "temp": 6.8,
            "weather": [{ "description": "broken clouds", "icon": "04d" }]
        },
        "hourly": (0..hours).map(|i| hourly(start + 3600 * i as i64)).collect::<Vec<_>>(),
        "daily": (0..days).map(|i| daily(start + 86400 * i as i64)).collect::<Vec<_>>()
    })
}

fn pollution() -> serde_json::Value {
    serde_json::json!({
        "coord": { "lon": 13.3889, "lat": 52.517 },
        "list": [
            {
                "dt": 1_700_000_000,
                "main": { "aqi": 2 },
                "components": {
                    "co": 260.35, "no": 0.01, "no2": 13.54, "o3": 47.21,
                    "so2": 1.85, "pm2_5": 6.12, "pm10": 8.4, "nh3": 0.72
                }
            },
            {
                "dt": 1_700_003_600,
                "main": { "aqi": 4 },
                "components": {
                    "co": 1.0, "no": 1.0, "no2": 1.0, "o3": 1.0,
                    "so2": 1.0, "pm2_5": 1.0, "pm10": 1.0, "nh3": 1.0
                }
            }
        ]
    })
}

async fn mount_json(server: &MockServer, at: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resolve_sends_expected_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEO_PATH))
        .and(query_param("q", "Berlin"))
        .and(query_param("limit", "5"))
        .and(query_param("appid", "TEST_KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([berlin()])))
        .expect(1)
        .mount(&server)
        .await;

    let candidates = client(&server).resolve("  Berlin ").await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].name, "Berlin");
    assert_eq!(candidates[0].state.as_deref(), Some("Berlin"));
    assert_eq!(candidates[0].display_name(Some("ru")), "Берлин");
}

#[tokio::test]
async fn test_resolve_empty_result_is_not_an_error() {
    let server = MockServer::start().await;
    mount_json(&server, GEO_PATH, 200, serde_json::json!([])).await;

    let candidates = client(&server).resolve("Qwertyuiop").await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_resolve_caps_results() {
    let server = MockServer::start().await;
    let many: Vec<_> = (0..7).map(|_| berlin()).collect();
    mount_json(&server, GEO_PATH, 200, serde_json::Value::Array(many)).await;

    let candidates = client(&server).resolve("Berlin").await.unwrap();
    assert_eq!(candidates.len(), 5);
}

#[tokio::test]
async fn test_resolve_empty_query_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server).resolve("   ").await.unwrap_err();
    assert!(matches!(err, FetchError::BadRequest(_)));
}

#[tokio::test]
async fn test_resolve_upstream_error_reports_status() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        GEO_PATH,
        401,
        serde_json::json!({ "cod": 401, "message": "Invalid API key" }),
    )
    .await;

    let err = client(&server).resolve("Berlin").await.unwrap_err();
    match err {
        FetchError::Upstream { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid API key"), "body should be kept: {}", body);
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_weather_decodes_one_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .and(query_param("units", "metric"))
        .and(query_param("lat", "52.517"))
        .and(query_param("lon", "13.3889"))
        .respond_with(ResponseTemplate::new(200).set_body_json(one_call(3, 2)))
        .mount(&server)
        .await;

    let snapshot = client(&server).fetch_weather(52.517, 13.3889).await.unwrap();

    assert_eq!(snapshot.timezone_offset, 3600);
    assert_eq!(snapshot.current.temperature, 6.8);
    assert_eq!(snapshot.hourly.len(), 3);
    assert_eq!(snapshot.hourly[0].wind_gust, Some(9.8));
    assert_eq!(snapshot.daily.len(), 2);
    assert_eq!(snapshot.daily[0].feels_like.day, 4.9);
    assert_eq!(snapshot.daily[0].precipitation_percent(), 60);
}

#[tokio::test]
async fn test_weather_malformed_payload_is_decode_error() {
    let server = MockServer::start().await;
    mount_json(&server, WEATHER_PATH, 200, serde_json::json!({ "current": { "temp": 1.0 } })).await;

    let err = client(&server).fetch_weather(52.5, 13.4).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_weather_invalid_coordinates_make_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server).fetch_weather(123.0, 13.4).await.unwrap_err();
    assert!(matches!(err, FetchError::BadRequest(_)));
}

#[tokio::test]
async fn test_pollution_returns_first_entry() {
    let server = MockServer::start().await;
    mount_json(&server, POLLUTION_PATH, 200, pollution()).await;

    let snapshot = client(&server).fetch_pollution(52.517, 13.3889).await.unwrap();

    assert_eq!(snapshot.aqi, AirQuality::Fair);
    assert_eq!(snapshot.components.no2, 13.54);
}

#[tokio::test]
async fn test_pollution_empty_list_is_decode_error() {
    let server = MockServer::start().await;
    mount_json(&server, POLLUTION_PATH, 200, serde_json::json!({ "list": [] })).await;

    let err = client(&server).fetch_pollution(52.517, 13.3889).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_slow_upstream_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POLLUTION_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(pollution())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = OpenWeatherClient::new(
        "TEST_KEY",
        Endpoints::with_base(&server.uri()),
        Duration::from_millis(200),
    )
    .unwrap();

    let err = client.fetch_pollution(52.517, 13.3889).await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "unexpected error: {err:?}");
}

fn aggregator(server: &MockServer) -> WeatherAggregator {
    let client = Arc::new(client(server));
    WeatherAggregator::new(client.clone(), client.clone(), client)
}

#[tokio::test]
async fn test_aggregate_full_pipeline() {
    let server = MockServer::start().await;
    mount_json(&server, GEO_PATH, 200, serde_json::json!([berlin()])).await;
    mount_json(&server, WEATHER_PATH, 200, one_call(48, 8)).await;
    mount_json(&server, POLLUTION_PATH, 200, pollution()).await;

    let view = aggregator(&server).aggregate("Berlin").await.unwrap();

    assert_eq!(view.location_name, "Berlin");
    assert_eq!(view.hourly.len(), 8);
    assert_eq!(view.daily.len(), 8);
    assert_eq!(view.description.as_deref(), Some("broken clouds"));

    let today = view.today.as_ref().unwrap();
    assert_eq!(today.high, 8.1);
    assert_eq!(today.low, 2.4);
    assert_eq!(today.average, 8.1);
    // 1_700_000_000 - 18000 is 17:13 UTC, 18:13 at +01:00.
    assert_eq!(today.sunrise.as_deref(), Some("18:13"));
    assert_eq!(view.pollution.as_ref().map(|p| p.aqi), Some(AirQuality::Fair));
    assert!(!view.is_partial());
}

#[tokio::test]
async fn test_aggregate_tolerates_pollution_outage() {
    let server = MockServer::start().await;
    mount_json(&server, GEO_PATH, 200, serde_json::json!([berlin()])).await;
    mount_json(&server, WEATHER_PATH, 200, one_call(2, 1)).await;
    mount_json(&server, POLLUTION_PATH, 503, serde_json::json!({ "message": "down" })).await;

    let view = aggregator(&server).aggregate("Berlin").await.unwrap();

    assert!(view.pollution.is_none());
    assert!(view.is_partial());
    assert!(matches!(
        view.warnings.as_slice(),
        [AggregationError::Partial(FetchError::Upstream { status: 503, .. })]
    ));
}

#[tokio::test]
async fn test_aggregate_weather_outage_is_fatal() {
    let server = MockServer::start().await;
    mount_json(&server, GEO_PATH, 200, serde_json::json!([berlin()])).await;
    mount_json(&server, WEATHER_PATH, 500, serde_json::json!({ "message": "boom" })).await;
    mount_json(&server, POLLUTION_PATH, 200, pollution()).await;

    let err = aggregator(&server).aggregate("Berlin").await.unwrap_err();
    assert!(matches!(err, AggregationError::Fatal { stage: Stage::Weather, .. }));
}

#[tokio::test]
async fn test_aggregate_not_found_skips_data_calls() {
    let server = MockServer::start().await;
    mount_json(&server, GEO_PATH, 200, serde_json::json!([])).await;

    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(one_call(1, 1)))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(POLLUTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(pollution()))
        .expect(0)
        .mount(&server)
        .await;

    let err = aggregator(&server).aggregate("Atlantis").await.unwrap_err();
    assert_eq!(err, AggregationError::NotFound("Atlantis".into()));
}
