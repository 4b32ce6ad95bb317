use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{aliases, error::FormatError};

/// One weather report as returned by the `json-data-10min.php` endpoint.
///
/// Values are built by [`Weather::from_upstream`], which maps the terse Dutch
/// field names of the API onto the fields below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub location: String,
    pub temperature: f64,
    /// Perceived temperature.
    pub feels_like: f64,
    pub summary: String,
    pub humidity_pct: u8,
    pub wind_direction: String,
    pub wind_speed_ms: f64,
    /// Beaufort scale.
    pub wind_force_bft: u8,
    pub wind_speed_kn: f64,
    pub wind_speed_kmh: f64,
    pub air_pressure_hpa: f64,
    pub air_pressure_mmhg: u16,
    pub dew_point: f64,
    pub visibility_km: u32,
    /// Expected weather for the next 24 hours.
    pub forecast: String,
    /// Local wall-clock time of sunrise.
    #[serde(with = "clock")]
    pub sunrise: NaiveTime,
    /// Local wall-clock time of sunset.
    #[serde(with = "clock")]
    pub sunset: NaiveTime,
    pub icon: String,

    pub today: DayForecast,
    pub tomorrow: DayForecast,
    pub day_after_tomorrow: DayForecast,

    pub alarm: bool,
    pub alarm_message: Option<String>,
}

/// Forecast for a single day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayForecast {
    pub summary: String,
    pub temp_max: i32,
    pub temp_min: i32,
    pub wind_force_bft: u8,
    pub wind_speed_kn: u16,
    pub wind_speed_ms: u16,
    pub wind_speed_kmh: u16,
    pub wind_direction: String,
    pub wind_direction_deg: u16,
    pub rain_chance_pct: u8,
    pub sun_chance_pct: u8,
}

impl Weather {
    /// Decode a single `liveweer` entry.
    pub fn from_upstream(raw: &Map<String, Value>) -> Result<Self, FormatError> {
        aliases::decode(raw)
    }

    /// Encode back into an object keyed by the upstream field names.
    pub fn to_upstream(&self) -> Result<Map<String, Value>, FormatError> {
        aliases::encode(self)
    }

    /// Canonical JSON text using the upstream field names.
    pub fn to_json(&self) -> Result<String, FormatError> {
        Ok(serde_json::to_string(&self.to_upstream()?)?)
    }

    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        let raw: Map<String, Value> = serde_json::from_str(text)?;
        Self::from_upstream(&raw)
    }

    /// The API reports "no alarm text" as an empty string.
    pub(crate) fn normalized(mut self) -> Self {
        if self.alarm_message.as_deref() == Some("") {
            self.alarm_message = None;
        }
        self
    }
}

/// `HH:MM` time-of-day, as the API writes it.
pub(crate) mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub const FORMAT: &str = "%H:%M";

    pub fn parse(text: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(text, FORMAT)
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(D::Error::custom)
    }
}
