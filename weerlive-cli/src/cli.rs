use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode};
use chrono::NaiveTime;
use weerlive_core::{Config, DayForecast, Weather, Weerlive};

// De Bilt, home of the KNMI.
const DEFAULT_LATITUDE: f64 = 52.1009166;
const DEFAULT_LONGITUDE: f64 = 5.1781301;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weerlive", version, about = "Weerlive weather CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key and default location.
    Configure,

    /// Show the current weather and the three day forecast.
    Show {
        /// Latitude; overrides the configured location.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude; overrides the configured location.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// API key; overrides the configured one.
        #[arg(long, env = "WEERLIVE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Print the report as JSON, keyed by the API's own field names.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { lat, lon, api_key, json } => {
                let mut config = Config::load()?;
                apply_overrides(&mut config, lat, lon, api_key.as_deref());
                show(&config, json).await
            }
        }
    }
}

/// Command-line values win over stored ones; a blank key leaves the stored one alone.
fn apply_overrides(
    config: &mut Config,
    lat: Option<f64>,
    lon: Option<f64>,
    api_key: Option<&str>,
) {
    if let Some(api_key) = api_key.filter(|key| !key.trim().is_empty()) {
        config.set_api_key(api_key);
    }
    if let (Some(lat), Some(lon)) = (lat, lon) {
        config.set_location(lat, lon);
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("Weerlive API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(&api_key);

    let current = config.location;
    let latitude = CustomType::<f64>::new("Latitude:")
        .with_default(current.map_or(DEFAULT_LATITUDE, |location| location.latitude))
        .prompt()
        .context("Failed to read latitude")?;
    let longitude = CustomType::<f64>::new("Longitude:")
        .with_default(current.map_or(DEFAULT_LONGITUDE, |location| location.longitude))
        .prompt()
        .context("Failed to read longitude")?;
    config.set_location(latitude, longitude);

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());

    Ok(())
}

async fn show(config: &Config, json: bool) -> Result<()> {
    if !config.has_api_key() {
        bail!(
            "No API key configured.\n\
             Hint: run `weerlive configure` or set WEERLIVE_API_KEY."
        );
    }

    let client = Weerlive::from_config(config)?;
    tracing::debug!(
        location = ?config.location,
        timeout = ?client.request_timeout(),
        "fetching weather"
    );
    let weather = client.weather().await.context("Failed to fetch weather from Weerlive")?;

    if json {
        println!("{}", weather.to_json()?);
    } else {
        print!("{}", render(&weather, chrono::Local::now().time()));
    }

    Ok(())
}

fn render(weather: &Weather, fetched_at: NaiveTime) -> String {
    let mut out = format!(
        "{} (fetched at {})\n\
         {}, {:.1}°C (feels like {:.1}°C), humidity {}%\n\
         Wind {} {} Bft ({:.1} m/s, {:.0} km/h)\n\
         Pressure {:.1} hPa, dew point {:.1}°C, visibility {} km\n\
         Sun {} - {}\n\
         {}\n",
        weather.location,
        fetched_at.format("%H:%M"),
        weather.summary,
        weather.temperature,
        weather.feels_like,
        weather.humidity_pct,
        weather.wind_direction,
        weather.wind_force_bft,
        weather.wind_speed_ms,
        weather.wind_speed_kmh,
        weather.air_pressure_hpa,
        weather.dew_point,
        weather.visibility_km,
        weather.sunrise.format("%H:%M"),
        weather.sunset.format("%H:%M"),
        weather.forecast,
    );

    for (label, day) in [
        ("Today", &weather.today),
        ("Tomorrow", &weather.tomorrow),
        ("Day after", &weather.day_after_tomorrow),
    ] {
        out.push_str(&render_day(label, day));
    }

    if weather.alarm {
        let message = weather.alarm_message.as_deref().unwrap_or("(no details)");
        out.push_str(&format!("WEATHER ALARM: {message}\n"));
    }

    out
}

fn render_day(label: &str, day: &DayForecast) -> String {
    format!(
        "{label:<10} {:<14} {:>3}/{:>3}°C  {} {} Bft  rain {}%  sun {}%\n",
        day.summary,
        day.temp_min,
        day.temp_max,
        day.wind_direction,
        day.wind_force_bft,
        day.rain_chance_pct,
        day.sun_chance_pct,
    )
}
