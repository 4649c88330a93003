//! Weather provider integration
//!
//! Daily rainfall and temperature come from a network of reporting stations;
//! each calendar day is reduced to the mean over the stations that reported
//! for it. The same-day forecast is a single regional record.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::HashMap, time::Duration};
use tracing::{debug, warn};

use crate::domain::{DailyWeather, GeoLocation, TodayForecast, ValueRange, Wind};
use crate::error::{IrrigationError, IrrigationResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherService: Send + Sync {
    /// `days` consecutive daily records starting at `start`.
    async fn daily_forecast(
        &self,
        location: &GeoLocation,
        start: NaiveDate,
        days: u32,
    ) -> IrrigationResult<Vec<DailyWeather>>;

    async fn today_forecast(&self, location: &GeoLocation) -> IrrigationResult<TodayForecast>;

    /// Observed daily records for the inclusive range `start..=end`. Days
    /// without any reporting station are left out.
    async fn historical_daily(
        &self,
        location: &GeoLocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<DailyWeather>>;
}

#[derive(Clone)]
pub struct HttpWeatherClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpWeatherClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("predictive-irrigation/", env!("CARGO_PKG_VERSION"))),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build weather HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key)]);
        }

        debug!(%url, "weather GET");
        let resp = request
            .send()
            .await
            .with_context(|| format!("weather GET {path} failed"))?;
        let status = resp.status();
        let body = resp.text().await.context("weather read failed")?;
        if !status.is_success() {
            anyhow::bail!("weather API error: HTTP {status}: {body}");
        }

        serde_json::from_str(&body).with_context(|| format!("weather JSON parse failed for {path}"))
    }

    fn location_query(location: &GeoLocation) -> Vec<(&'static str, String)> {
        vec![
            ("lat", format!("{:.6}", location.latitude)),
            ("lon", format!("{:.6}", location.longitude)),
        ]
    }
}

#[async_trait]
impl WeatherService for HttpWeatherClient {
    async fn daily_forecast(
        &self,
        location: &GeoLocation,
        start: NaiveDate,
        days: u32,
    ) -> IrrigationResult<Vec<DailyWeather>> {
        if days == 0 {
            return Err(IrrigationError::ForecastUnavailable(
                "at least one forecast day must be requested".to_string(),
            ));
        }

        let mut query = Self::location_query(location);
        query.push(("start", start.to_string()));
        query.push(("days", days.to_string()));

        let raw: RawDays = self
            .get_json("/forecast/daily", &query)
            .await
            .map_err(IrrigationError::forecast_unavailable)?;
        consecutive_days(raw, start, days).map_err(IrrigationError::forecast_unavailable)
    }

    async fn today_forecast(&self, location: &GeoLocation) -> IrrigationResult<TodayForecast> {
        let raw: RawToday = self
            .get_json("/forecast/24h", &Self::location_query(location))
            .await
            .map_err(IrrigationError::forecast_unavailable)?;
        Ok(raw.into())
    }

    async fn historical_daily(
        &self,
        location: &GeoLocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<DailyWeather>> {
        let mut query = Self::location_query(location);
        query.push(("start", start.to_string()));
        query.push(("end", end.to_string()));

        let raw: RawDays = self
            .get_json("/history/daily", &query)
            .await
            .map_err(IrrigationError::forecast_unavailable)?;

        let records = reported_days(raw, start, end);
        if records.is_empty() {
            return Err(IrrigationError::ForecastUnavailable(format!(
                "no weather history reported between {start} and {end}"
            )));
        }
        Ok(records)
    }
}

/// Mean rainfall and temperature over the stations of one day.
pub fn average_stations(date: NaiveDate, stations: &[StationReading]) -> Option<DailyWeather> {
    if stations.is_empty() {
        return None;
    }
    let n = stations.len() as f64;
    Some(DailyWeather {
        date,
        rainfall_mm: stations.iter().map(|s| s.rainfall_mm).sum::<f64>() / n,
        temperature_c: stations.iter().map(|s| s.temperature_c).sum::<f64>() / n,
        station_count: stations.len(),
    })
}

fn by_date(raw: RawDays) -> HashMap<NaiveDate, Vec<StationReading>> {
    let mut days: HashMap<NaiveDate, Vec<StationReading>> = HashMap::new();
    for day in raw.days {
        days.entry(day.date).or_default().extend(day.stations);
    }
    days
}

fn consecutive_days(raw: RawDays, start: NaiveDate, days: u32) -> Result<Vec<DailyWeather>> {
    let stations = by_date(raw);
    (0..days)
        .map(|offset| {
            let date = start + ChronoDuration::days(i64::from(offset));
            let reported = stations
                .get(&date)
                .with_context(|| format!("forecast response is missing {date}"))?;
            average_stations(date, reported)
                .with_context(|| format!("no station reported a forecast for {date}"))
        })
        .collect()
}

fn reported_days(raw: RawDays, start: NaiveDate, end: NaiveDate) -> Vec<DailyWeather> {
    let stations = by_date(raw);
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter_map(|date| {
            let record = stations
                .get(&date)
                .and_then(|reported| average_stations(date, reported));
            if record.is_none() {
                warn!(%date, "no weather stations reported; day left out of history");
            }
            record
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationReading {
    #[serde(default)]
    pub station_id: Option<String>,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
}

#[derive(Debug, Deserialize)]
struct RawDays {
    days: Vec<RawDay>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    date: NaiveDate,
    #[serde(default)]
    stations: Vec<StationReading>,
}

#[derive(Debug, Deserialize)]
struct RawToday {
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    temperature: ValueRange,
    relative_humidity: ValueRange,
    forecast: RawForecastText,
    wind: Wind,
}

#[derive(Debug, Deserialize)]
struct RawForecastText {
    text: String,
}

impl From<RawToday> for TodayForecast {
    fn from(raw: RawToday) -> Self {
        TodayForecast {
            valid_from: raw.valid_from,
            valid_to: raw.valid_to,
            temperature: raw.temperature,
            relative_humidity: raw.relative_humidity,
            forecast_text: raw.forecast.text,
            wind: raw.wind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawDays {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_average_over_stations() {
        let stations = vec![
            StationReading {
                station_id: Some("S1".into()),
                rainfall_mm: 2.0,
                temperature_c: 28.0,
            },
            StationReading {
                station_id: Some("S2".into()),
                rainfall_mm: 6.0,
                temperature_c: 30.0,
            },
        ];
        let record = average_stations(date(1), &stations).unwrap();
        assert_eq!(record.rainfall_mm, 4.0);
        assert_eq!(record.temperature_c, 29.0);
        assert_eq!(record.station_count, 2);

        assert!(average_stations(date(1), &[]).is_none());
    }

    #[test]
    fn test_consecutive_days_in_order() {
        let body = raw(json!({"days": [
            {"date": "2026-06-02", "stations": [{"station_id": "S1", "rainfall_mm": 3.0, "temperature_c": 27.0}]},
            {"date": "2026-06-01", "stations": [{"station_id": "S1", "rainfall_mm": 1.0, "temperature_c": 29.0}]},
            {"date": "2026-06-03", "stations": [{"station_id": "S1", "rainfall_mm": 0.0, "temperature_c": 31.0}]}
        ]}));

        let records = consecutive_days(body, date(1), 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, date(1));
        assert_eq!(records[1].date, date(2));
        assert_eq!(records[1].rainfall_mm, 3.0);
    }

    #[test]
    fn test_missing_or_silent_day_is_an_error() {
        let missing = raw(json!({"days": [
            {"date": "2026-06-01", "stations": [{"rainfall_mm": 1.0, "temperature_c": 29.0}]}
        ]}));
        let err = consecutive_days(missing, date(1), 2).unwrap_err();
        assert!(format!("{err:#}").contains("missing 2026-06-02"));

        let silent = raw(json!({"days": [{"date": "2026-06-01", "stations": []}]}));
        let err = consecutive_days(silent, date(1), 1).unwrap_err();
        assert!(format!("{err:#}").contains("no station reported"));
    }

    #[test]
    fn test_history_skips_unreported_days() {
        let body = raw(json!({"days": [
            {"date": "2026-06-01", "stations": [{"rainfall_mm": 4.0, "temperature_c": 26.0}]},
            {"date": "2026-06-02", "stations": []},
            {"date": "2026-06-04", "stations": [{"rainfall_mm": 0.5, "temperature_c": 30.0}]},
            {"date": "2026-06-09", "stations": [{"rainfall_mm": 9.0, "temperature_c": 30.0}]}
        ]}));

        let records = reported_days(body, date(1), date(5));
        let dates: Vec<_> = records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(1), date(4)]);
    }

    #[test]
    fn test_today_forecast_wire_format() {
        let raw: RawToday = serde_json::from_value(json!({
            "valid_from": "2026-06-15T00:00:00Z",
            "valid_to": "2026-06-16T00:00:00Z",
            "temperature": {"low": 25.0, "high": 33.0},
            "relative_humidity": {"low": 55.0, "high": 95.0},
            "forecast": {"text": "Thundery Showers"},
            "wind": {"speed": {"low": 10.0, "high": 20.0}, "direction": "SSE"}
        }))
        .unwrap();

        let today: TodayForecast = raw.into();
        assert_eq!(today.temperature_c(), 29.0);
        assert_eq!(today.expected_rainfall_mm(), 15.0);
        assert_eq!(today.wind.direction, "SSE");
    }
}
