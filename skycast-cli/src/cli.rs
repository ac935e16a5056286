use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use skycast_core::service::locationiq::{LocationIqClient, Place};
use skycast_core::service::openweather::Forecast;
use skycast_core::{
    Config, Coordinates, Dispatcher, ServiceId, locationiq_from_config, model::kelvin_to_celsius,
    openweather_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Weather & location lookup")]
pub struct Cli {
    /// Log filter, e.g. "info" or "skycast_core=debug".
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for an upstream service.
    Configure {
        /// Service short name, "locationiq" or "openweather".
        service: String,
    },

    /// Forward geocoding: find places matching a query.
    Search {
        /// Free-text location query, e.g. "Paris".
        query: String,
    },

    /// Autocomplete a partial location query.
    Suggest {
        /// Partial query, e.g. "Par".
        query: String,
    },

    /// Reverse geocoding: name the place at given coordinates.
    Locate {
        /// Latitude in decimal degrees.
        lat: f64,
        /// Longitude in decimal degrees.
        lon: f64,
    },

    /// Current weather for a location.
    Weather {
        /// Location query; the best geocoding match is used.
        query: String,
    },

    /// 5-day forecast for a location, grouped by day.
    Forecast {
        /// Location query; the best geocoding match is used.
        query: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;

        // One dispatcher for the whole invocation; every client shares its
        // pending-request registry.
        let dispatch = Arc::new(Dispatcher::new());

        match self.command {
            Command::Configure { service } => configure(config, &service),
            Command::Search { query } => {
                let client = locationiq_from_config(&config, dispatch)?;
                let places = client.forward_search(&query).await?;
                print_places(&places);
                Ok(())
            }
            Command::Suggest { query } => {
                let client = locationiq_from_config(&config, dispatch)?;
                let places = client.autocomplete(&query).await?;
                print_places(&places);
                Ok(())
            }
            Command::Locate { lat, lon } => {
                let client = locationiq_from_config(&config, dispatch)?;
                let place = client.reverse(lat, lon).await?;
                println!("{}", place.display_name);
                if let Some(address) = &place.address {
                    for part in [&address.road, &address.city, &address.state, &address.country] {
                        if let Some(part) = part {
                            println!("  {part}");
                        }
                    }
                }
                Ok(())
            }
            Command::Weather { query } => {
                let geocoder = locationiq_from_config(&config, dispatch.clone())?;
                let weather = openweather_from_config(&config, dispatch)?;

                let (place, coords) = best_match(&geocoder, &query).await?;
                let current = weather.current_weather(coords).await?;

                let condition = current
                    .weather
                    .first()
                    .map(|w| w.description.as_str())
                    .unwrap_or("unknown conditions");

                println!("{}", place.display_name);
                println!(
                    "  {condition}, {:.1}°C, humidity {}%, wind {:.1} m/s, cloud cover {}%",
                    kelvin_to_celsius(current.main.temp),
                    current.main.humidity,
                    current.wind.speed,
                    current.clouds.all,
                );
                Ok(())
            }
            Command::Forecast { query } => {
                let geocoder = locationiq_from_config(&config, dispatch.clone())?;
                let weather = openweather_from_config(&config, dispatch)?;

                let (place, coords) = best_match(&geocoder, &query).await?;
                let forecast = weather.forecast(coords).await?;

                println!("{}", place.display_name);
                print_forecast(&forecast)?;
                Ok(())
            }
        }
    }
}

fn configure(mut config: Config, service: &str) -> Result<()> {
    let id = ServiceId::try_from(service)?;

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    config.upsert_service_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!("Saved API key for {id} to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn best_match(
    geocoder: &LocationIqClient,
    query: &str,
) -> Result<(Place, Coordinates)> {
    let places = geocoder.forward_search(query).await?;
    let place = places
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No places found matching '{query}'"))?;
    let coords = place.coordinates()?;
    Ok((place, coords))
}

fn print_places(places: &[Place]) {
    if places.is_empty() {
        println!("No matches.");
        return;
    }
    for (i, place) in places.iter().enumerate() {
        let kind = match (&place.class, &place.kind) {
            (Some(class), Some(kind)) => format!(" [{class}/{kind}]"),
            _ => String::new(),
        };
        println!("{:2}. {} ({}, {}){kind}", i + 1, place.display_name, place.lat, place.lon);
    }
}

fn print_forecast(forecast: &Forecast) -> Result<()> {
    // Group 3-hourly entries by calendar day, mirroring the forecast view of
    // the original app.
    let mut by_day = BTreeMap::new();
    for entry in &forecast.list {
        let when = NaiveDateTime::parse_from_str(&entry.dt_txt, "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("Unexpected forecast timestamp '{}'", entry.dt_txt))?;
        by_day.entry(when.date()).or_insert_with(Vec::new).push((when.time(), entry));
    }

    for (day, entries) in by_day {
        println!("{}", day.format("%a %d %b"));
        for (time, entry) in entries {
            let condition = entry
                .weather
                .first()
                .map(|w| w.description.as_str())
                .unwrap_or("unknown");
            println!(
                "  {}  {:>4.0}°C  {}",
                time.format("%H:%M"),
                kelvin_to_celsius(entry.main.temp).floor(),
                condition,
            );
        }
    }
    Ok(())
}
