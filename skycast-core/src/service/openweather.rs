use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dispatch::{Dispatcher, HttpTransport, RequestDescriptor, Transport};
use crate::model::Coordinates;

/// OpenWeather client: current conditions and the 5-day/3-hour forecast.
/// Temperatures stay in Kelvin here; the presentation layer converts.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient<T: Transport = HttpTransport> {
    base_url: String,
    api_key: String,
    dispatch: Arc<Dispatcher<T>>,
}

impl<T: Transport> OpenWeatherClient<T> {
    pub fn new(base_url: impl Into<String>, api_key: String, dispatch: Arc<Dispatcher<T>>) -> Self {
        Self { base_url: base_url.into(), api_key, dispatch }
    }

    pub async fn current_weather(&self, coords: Coordinates) -> Result<CurrentWeather> {
        self.get_json("/data/2.5/weather", coords)
            .await
            .context("OpenWeather current conditions request failed")
    }

    pub async fn forecast(&self, coords: Coordinates) -> Result<Forecast> {
        self.get_json("/data/2.5/forecast", coords)
            .await
            .context("OpenWeather forecast request failed")
    }

    async fn get_json<R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        coords: Coordinates,
    ) -> Result<R> {
        let params = vec![
            ("lat".to_string(), coords.lat.to_string()),
            ("lon".to_string(), coords.lon.to_string()),
            ("appid".to_string(), self.api_key.clone()),
        ];

        let request = RequestDescriptor::get(format!("{}{}", self.base_url, path), params);
        let reply = self.dispatch.dispatch(&request).await?;

        serde_json::from_str(&reply.body)
            .with_context(|| format!("Failed to parse OpenWeather response from {path}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherCondition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

/// Kelvin on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct MainMetrics {
    pub temp: f64,
    pub humidity: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wind {
    pub speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Clouds {
    /// Cloud cover percentage.
    pub all: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub weather: Vec<WeatherCondition>,
    pub main: MainMetrics,
    pub wind: Wind,
    pub clouds: Clouds,
    /// Resolved location name, when the API supplies one.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastEntry {
    /// Timestamp formatted `YYYY-MM-DD HH:MM:SS` (UTC).
    pub dt_txt: String,
    pub weather: Vec<WeatherCondition>,
    pub main: MainMetrics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Forecast {
    pub list: Vec<ForecastEntry>,
}
