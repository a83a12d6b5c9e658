//! Plain-text rendering of an aggregated view.

use chrono::{DateTime, FixedOffset, Utc};
use skyview_core::{
    AggregatedWeatherView, LocationCandidate,
    model::{TodayDetails, format_clock},
};

const UNKNOWN: &str = "--";

fn temp(value: f64) -> String {
    format!("{}°", value.round() as i64)
}

fn or_unknown<T>(value: Option<T>, f: impl FnOnce(T) -> String) -> String {
    value.map(f).unwrap_or_else(|| UNKNOWN.to_string())
}

fn weekday(time: DateTime<Utc>, offset_secs: i32) -> String {
    match FixedOffset::east_opt(offset_secs) {
        Some(offset) => time.with_timezone(&offset).format("%a").to_string(),
        None => time.format("%a").to_string(),
    }
}

pub fn render_view(view: &AggregatedWeatherView) -> String {
    let mut lines = Vec::new();
    let today: Option<&TodayDetails> = view.today.as_ref();

    lines.push(format!("{} ({})", view.location_name, view.location.label()));
    lines.push(format!(
        "{}  {}",
        temp(view.temperature),
        view.description.as_deref().unwrap_or(UNKNOWN)
    ));
    lines.push(format!(
        "H: {}  L: {}  Feels like: {}  Average: {}",
        or_unknown(today.map(|t| t.high), temp),
        or_unknown(today.map(|t| t.low), temp),
        or_unknown(today.map(|t| t.feels_like), temp),
        or_unknown(today.map(|t| t.average), temp),
    ));
    lines.push(format!(
        "Wind: {} m/s from {}°, gusts {} m/s",
        or_unknown(today.map(|t| t.wind_speed), |v| format!("{v:.1}")),
        or_unknown(today.map(|t| t.wind_deg), |v| v.to_string()),
        or_unknown(today.and_then(|t| t.wind_gust), |v| format!("{v:.1}")),
    ));
    lines.push(format!(
        "Sunrise: {}  Sunset: {}",
        or_unknown(today.and_then(|t| t.sunrise.clone()), |v| v),
        or_unknown(today.and_then(|t| t.sunset.clone()), |v| v),
    ));
    lines.push(format!(
        "UV index: {}  Humidity: {}%  Pressure: {} hPa",
        or_unknown(today, |t| format!("{:.0} ({})", t.uv_index, t.uv_level().label())),
        or_unknown(today.map(|t| t.humidity), |v| v.to_string()),
        or_unknown(today.map(|t| t.pressure), |v| v.to_string()),
    ));

    lines.push(String::new());
    lines.push(
        view.hourly_summary
            .clone()
            .unwrap_or_else(|| "No summary available for today.".to_string()),
    );
    for hour in &view.hourly {
        lines.push(format!(
            "  {}  {:>4}  {}",
            format_clock(hour.time, view.timezone_offset),
            temp(hour.temperature),
            hour.condition.as_ref().map(|c| c.description.as_str()).unwrap_or(UNKNOWN),
        ));
    }

    lines.push(String::new());
    lines.push(format!("{}-day forecast", view.daily.len()));
    for day in &view.daily {
        lines.push(format!(
            "  {}  {:>4} / {:<4}  {:>3}%  {}",
            weekday(day.time, view.timezone_offset),
            temp(day.temp_min),
            temp(day.temp_max),
            day.precipitation_percent(),
            day.condition.as_ref().map(|c| c.description.as_str()).unwrap_or(UNKNOWN),
        ));
    }

    lines.push(String::new());
    match &view.pollution {
        Some(air) => {
            let c = &air.components;
            lines.push(format!("Air quality: {} ({})", air.aqi.index(), air.aqi.label()));
            lines.push(format!(
                "  PM2.5 {:.1}  PM10 {:.1}  O3 {:.1}  NO2 {:.1}  SO2 {:.1}  CO {:.1}",
                c.pm2_5, c.pm10, c.o3, c.no2, c.so2, c.co
            ));
        }
        None => lines.push("Air quality: unavailable".to_string()),
    }

    lines.join("\n")
}

pub fn render_candidates(candidates: &[LocationCandidate]) -> String {
    if candidates.is_empty() {
        return "No cities found. Try searching for another city.".to_string();
    }
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:>2}. {}", i + 1, c.label()))
        .collect::<Vec<_>>()
        .join("\n")
}
