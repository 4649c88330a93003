//! Deterministic tropical weather for local runs without a weather provider.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::{day_start, DailyWeather, GeoLocation, TodayForecast, ValueRange, Wind};
use crate::error::{IrrigationError, IrrigationResult};
use crate::forecast::WeatherService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSimulatorConfig {
    pub random_seed: u64,
    /// Probability that a day has any rain
    pub rain_probability: f64,
    pub max_rainfall_mm: f64,
    pub min_temperature_c: f64,
    pub max_temperature_c: f64,
}

impl Default for WeatherSimulatorConfig {
    fn default() -> Self {
        Self {
            random_seed: 7,
            rain_probability: 0.45,
            max_rainfall_mm: 25.0,
            min_temperature_c: 25.0,
            max_temperature_c: 33.0,
        }
    }
}

/// Weather where each calendar day is drawn from its own seeded generator,
/// so history and forecasts agree for the same date.
#[derive(Debug, Clone, Default)]
pub struct SimulatedWeather {
    config: WeatherSimulatorConfig,
}

impl SimulatedWeather {
    pub fn new(config: WeatherSimulatorConfig) -> Self {
        Self { config }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(WeatherSimulatorConfig {
            random_seed: seed,
            ..Default::default()
        })
    }

    fn rng_for(&self, date: NaiveDate) -> StdRng {
        let day = date.num_days_from_ce() as u64;
        StdRng::seed_from_u64(self.config.random_seed ^ day.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    pub fn day(&self, date: NaiveDate) -> DailyWeather {
        let mut rng = self.rng_for(date);
        let rainfall_mm = if rng.gen_bool(self.config.rain_probability.clamp(0.0, 1.0)) {
            rng.gen_range(0.5..self.config.max_rainfall_mm.max(1.0))
        } else {
            0.0
        };
        let temperature_c = rng.gen_range(self.config.min_temperature_c..self.config.max_temperature_c);
        DailyWeather {
            date,
            rainfall_mm,
            temperature_c,
            station_count: 1,
        }
    }

    pub fn today(&self, date: NaiveDate) -> TodayForecast {
        let day = self.day(date);
        let valid_from = day_start(date);
        TodayForecast {
            valid_from,
            valid_to: valid_from + Duration::days(1),
            temperature: ValueRange {
                low: day.temperature_c - 3.0,
                high: day.temperature_c + 3.0,
            },
            relative_humidity: ValueRange {
                low: 60.0,
                high: if day.rainfall_mm > 0.0 { 95.0 } else { 85.0 },
            },
            forecast_text: condition_for(day.rainfall_mm).to_string(),
            wind: Wind {
                speed: ValueRange { low: 5.0, high: 15.0 },
                direction: "SSE".to_string(),
            },
        }
    }
}

/// Forecast text whose rainfall category brackets `rainfall_mm`.
fn condition_for(rainfall_mm: f64) -> &'static str {
    match rainfall_mm {
        r if r <= 0.0 => "Partly Cloudy (Day)",
        r if r < 2.0 => "Passing Showers",
        r if r < 5.0 => "Light Rain",
        r if r < 11.0 => "Moderate Rain",
        r if r < 18.0 => "Thundery Showers",
        _ => "Heavy Thundery Showers",
    }
}

#[async_trait]
impl WeatherService for SimulatedWeather {
    async fn daily_forecast(
        &self,
        _location: &GeoLocation,
        start: NaiveDate,
        days: u32,
    ) -> IrrigationResult<Vec<DailyWeather>> {
        if days == 0 {
            return Err(IrrigationError::ForecastUnavailable(
                "forecast of zero days requested".into(),
            ));
        }
        Ok(start.iter_days().take(days as usize).map(|d| self.day(d)).collect())
    }

    async fn today_forecast(&self, _location: &GeoLocation) -> IrrigationResult<TodayForecast> {
        Ok(self.today(Utc::now().date_naive()))
    }

    async fn historical_daily(
        &self,
        _location: &GeoLocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<DailyWeather>> {
        if end < start {
            return Err(IrrigationError::ForecastUnavailable(format!(
                "history range {start}..{end} is empty"
            )));
        }
        Ok(start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| self.day(d))
            .collect())
    }
}
