use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Station-averaged weather for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
    pub station_count: usize,
}

/// Low/high bounds of a forecast quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

impl ValueRange {
    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: ValueRange,
    pub direction: String,
}

/// Same-day 24-hour forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayForecast {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub temperature: ValueRange,
    pub relative_humidity: ValueRange,
    pub forecast_text: String,
    pub wind: Wind,
}

impl TodayForecast {
    pub fn temperature_c(&self) -> f64 {
        self.temperature.midpoint()
    }

    /// Rainfall implied by the textual condition. The 24-hour forecast has no
    /// quantitative rainfall, so each rain category maps to a typical daily
    /// accumulation in millimetres.
    pub fn expected_rainfall_mm(&self) -> f64 {
        rainfall_for_condition(&self.forecast_text)
    }
}

/// Rough daily rainfall for a forecast condition. The amounts are an
/// approximation chosen for this crate, not taken from the weather provider;
/// any rain category at least counts as wet and every other condition as dry.
pub fn rainfall_for_condition(text: &str) -> f64 {
    match text.trim().to_ascii_lowercase().as_str() {
        "passing showers" => 1.0,
        "light rain" | "light showers" => 2.5,
        "moderate rain" | "showers" => 7.5,
        "thundery showers" => 15.0,
        "heavy rain" | "heavy showers" => 20.0,
        "heavy thundery showers" | "heavy thundery showers with gusty winds" => 25.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Light Rain", 2.5)]
    #[case("  heavy thundery showers with gusty winds ", 25.0)]
    #[case("Passing Showers", 1.0)]
    #[case("Partly Cloudy (Day)", 0.0)]
    #[case("Fair & Warm", 0.0)]
    fn test_rainfall_for_condition(#[case] text: &str, #[case] expected: f64) {
        assert_eq!(rainfall_for_condition(text), expected);
    }

    #[rstest]
    #[case("Showers")]
    #[case("Moderate Rain")]
    #[case("Heavy Showers")]
    #[case("Light Showers")]
    fn test_rain_categories_count_as_wet(#[case] text: &str) {
        assert!(rainfall_for_condition(text) >= 1.0);
    }

    #[test]
    fn test_today_forecast_temperature_midpoint() {
        let forecast = TodayForecast {
            valid_from: Utc::now(),
            valid_to: Utc::now(),
            temperature: ValueRange { low: 25.0, high: 33.0 },
            relative_humidity: ValueRange { low: 55.0, high: 95.0 },
            forecast_text: "Thundery Showers".to_string(),
            wind: Wind {
                speed: ValueRange { low: 10.0, high: 20.0 },
                direction: "NE".to_string(),
            },
        };

        assert_eq!(forecast.temperature_c(), 29.0);
        assert_eq!(forecast.expected_rainfall_mm(), 15.0);
    }
}
