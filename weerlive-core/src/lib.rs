//! Core library for the `weerlive` CLI.
//!
//! This crate defines:
//! - The [`Weerlive`] client, which performs a single request against the
//!   Weerlive API and classifies the (always HTTP 200) answer
//! - The [`Weather`] report model and the field table that decodes it
//! - Configuration & credentials handling
//!
//! It is used by `weerlive-cli`, but can also be reused by other binaries or services.

pub mod aliases;
pub mod client;
pub mod config;
pub mod error;
pub mod model;

pub use client::Weerlive;
pub use config::{Config, Location};
pub use error::{FormatError, Result, WeerliveError};
pub use model::{DayForecast, Weather};

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::{Map, Value};

    use crate::Weather;

    pub const WEATHER: &str = include_str!("../fixtures/weather.json");
    pub const WEATHER_ALARM: &str = include_str!("../fixtures/weather_alarm.json");
    pub const ERROR_AUTH: &str = include_str!("../fixtures/error_auth.txt");
    pub const ERROR_RATE_LIMIT: &str = include_str!("../fixtures/error_rate_limit.txt");

    /// The `liveweer[0]` object of a full API payload.
    pub fn report(payload: &str) -> Map<String, Value> {
        let payload: Value = serde_json::from_str(payload).expect("fixture should be JSON");
        payload["liveweer"][0].as_object().cloned().expect("fixture should hold a report")
    }

    pub fn weather(payload: &str) -> Weather {
        Weather::from_upstream(&report(payload)).expect("fixture should decode")
    }
}
