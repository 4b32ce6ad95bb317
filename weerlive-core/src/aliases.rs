//! Field table between the Weerlive payload and [`Weather`].
//!
//! The API uses short Dutch keys (`temp`, `windms`, `d0tmax`, ...). Every key
//! the model knows about is listed exactly once below, together with the
//! conversion applied to its value. Decoding walks the table once, turning
//! the raw object into one keyed by model field names, and hands that to
//! serde. Encoding walks the same table backwards.

use serde_json::{Map, Number, Value};

use crate::{error::FormatError, model::Weather, model::clock};

/// How a raw upstream value becomes a model value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Text,
    /// Missing, `null` and `""` all mean "no value".
    OptionalText,
    Decimal,
    Integer,
    /// `"HH:MM"` local wall-clock time.
    ClockTime,
    /// Integer encoded as text, `0` is false.
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alias {
    pub upstream: &'static str,
    pub field: &'static str,
    pub conversion: Conversion,
}

const fn alias(upstream: &'static str, field: &'static str, conversion: Conversion) -> Alias {
    Alias { upstream, field, conversion }
}

use Conversion::*;

/// Top-level fields of a report.
pub const CURRENT: &[Alias] = &[
    alias("plaats", "location", Text),
    alias("temp", "temperature", Decimal),
    alias("gtemp", "feels_like", Decimal),
    alias("samenv", "summary", Text),
    alias("lv", "humidity_pct", Integer),
    alias("windr", "wind_direction", Text),
    alias("windms", "wind_speed_ms", Decimal),
    alias("winds", "wind_force_bft", Integer),
    alias("windk", "wind_speed_kn", Decimal),
    alias("windkmh", "wind_speed_kmh", Decimal),
    alias("luchtd", "air_pressure_hpa", Decimal),
    alias("ldmmhg", "air_pressure_mmhg", Integer),
    alias("dauwp", "dew_point", Decimal),
    alias("zicht", "visibility_km", Integer),
    alias("verw", "forecast", Text),
    alias("sup", "sunrise", ClockTime),
    alias("sunder", "sunset", ClockTime),
    alias("image", "icon", Text),
    alias("alarm", "alarm", Flag),
    alias("alarmtxt", "alarm_message", OptionalText),
];

/// Per-day fields; the upstream key is the day prefix followed by `upstream`.
pub const DAILY: &[Alias] = &[
    alias("weer", "summary", Text),
    alias("tmax", "temp_max", Integer),
    alias("tmin", "temp_min", Integer),
    alias("windk", "wind_force_bft", Integer),
    alias("windknp", "wind_speed_kn", Integer),
    alias("windms", "wind_speed_ms", Integer),
    alias("windkmh", "wind_speed_kmh", Integer),
    alias("windr", "wind_direction", Text),
    alias("windrgr", "wind_direction_deg", Integer),
    alias("neerslag", "rain_chance_pct", Integer),
    alias("zon", "sun_chance_pct", Integer),
];

/// Upstream prefix and model field of each forecast day.
pub const DAYS: [(&str, &str); 3] =
    [("d0", "today"), ("d1", "tomorrow"), ("d2", "day_after_tomorrow")];

pub(crate) fn decode(raw: &Map<String, Value>) -> Result<Weather, FormatError> {
    let mut fields = Map::with_capacity(CURRENT.len() + DAYS.len());

    for alias in CURRENT {
        let value = alias.conversion.decode(alias.upstream, raw.get(alias.upstream))?;
        fields.insert(alias.field.to_string(), value);
    }

    for (prefix, day) in DAYS {
        let mut group = Map::with_capacity(DAILY.len());
        for alias in DAILY {
            let key = format!("{prefix}{}", alias.upstream);
            let value = alias.conversion.decode(&key, raw.get(&key))?;
            group.insert(alias.field.to_string(), value);
        }
        fields.insert(day.to_string(), Value::Object(group));
    }

    let weather: Weather = serde_json::from_value(Value::Object(fields))?;
    Ok(weather.normalized())
}

pub(crate) fn encode(weather: &Weather) -> Result<Map<String, Value>, FormatError> {
    let fields = match serde_json::to_value(weather)? {
        Value::Object(fields) => fields,
        other => return Err(shape_error(format!("weather serialized to {other}"))),
    };

    let mut raw = Map::with_capacity(CURRENT.len() + DAYS.len() * DAILY.len());

    for alias in CURRENT {
        let value = fields.get(alias.field).cloned().unwrap_or(Value::Null);
        raw.insert(alias.upstream.to_string(), alias.conversion.encode(value));
    }

    for (prefix, day) in DAYS {
        let group = fields
            .get(day)
            .and_then(Value::as_object)
            .ok_or_else(|| FormatError::MissingField { field: day.to_string() })?;
        for alias in DAILY {
            let value = group.get(alias.field).cloned().unwrap_or(Value::Null);
            raw.insert(format!("{prefix}{}", alias.upstream), alias.conversion.encode(value));
        }
    }

    Ok(raw)
}

impl Conversion {
    fn expected(self) -> &'static str {
        match self {
            Text | OptionalText => "text",
            Decimal => "decimal number",
            Integer => "integer",
            ClockTime => "HH:MM time",
            Flag => "integer flag",
        }
    }

    fn decode(self, key: &str, value: Option<&Value>) -> Result<Value, FormatError> {
        let value = match value {
            None | Some(Value::Null) if self == OptionalText => return Ok(Value::Null),
            None => return Err(FormatError::MissingField { field: key.to_string() }),
            Some(value) => value,
        };

        let converted = match self {
            Text | OptionalText => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(number) => Some(Value::String(number.to_string())),
                _ => None,
            },
            Decimal => decimal(value).and_then(Number::from_f64).map(Value::Number),
            Integer => integer(value).map(Value::from),
            ClockTime => value
                .as_str()
                .and_then(|text| clock::parse(text.trim()).ok())
                .map(|time| Value::String(time.format(clock::FORMAT).to_string())),
            Flag => match value {
                Value::Bool(flag) => Some(Value::Bool(*flag)),
                other => integer(other).map(|flag| Value::Bool(flag != 0)),
            },
        };

        converted.ok_or_else(|| FormatError::InvalidValue {
            field: key.to_string(),
            expected: self.expected(),
            value: value.to_string(),
        })
    }

    /// Inverse of `decode`, producing the text-heavy shape the API sends.
    fn encode(self, value: Value) -> Value {
        match (self, value) {
            (Flag, Value::Bool(flag)) => Value::String(if flag { "1" } else { "0" }.to_string()),
            (OptionalText, Value::Null) => Value::String(String::new()),
            (Decimal | Integer, Value::Number(number)) => Value::String(number.to_string()),
            (_, value) => value,
        }
    }
}

fn decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn shape_error(message: String) -> FormatError {
    FormatError::Shape(<serde_json::Error as serde::ser::Error>::custom(message))
}
